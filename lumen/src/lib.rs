use crate::main_loop::EngineLoop;

mod app;
mod engine;
mod main_loop;

pub use app::{App, RenderContext, RenderableApp};
pub use engine::{gpu_config, Engine};

pub use paste::paste;

macro_rules! module_facade {
    ($name:ident) => {
        $crate::paste!{
            pub mod $name {
                pub use [<lumen_ $name>]::*;
            }
        }
    };
}

module_facade!(core);
module_facade!(rhi);
module_facade!(gpu);
module_facade!(phong);

/// Launch main engine loop with specific App.
pub fn launch<A: RenderableApp>() -> Result<(), anyhow::Error> {
    let args = lumen_core::cli::EngineArgs::parse_args();
    lumen_core::log::initialize(args.log_level.into())?;
    let _profiler = lumen_core::profile::initialize(args.profile)?;

    let app = A::new(&args)?;

    let main_loop = EngineLoop::new(app, args)?;
    main_loop.run()?;

    Ok(())
}
