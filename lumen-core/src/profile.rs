use log::info;

/// Running profiler server; dropping it stops serving puffin data.
pub struct ProfileServer {
    _server: puffin_http::Server,
}

/// Start a puffin server on the default port when `enabled` is set.
pub fn initialize(enabled: bool) -> Result<Option<ProfileServer>, anyhow::Error> {
    if !enabled {
        return Ok(None);
    }

    let server_addr = format!("127.0.0.1:{}", puffin_http::DEFAULT_PORT);
    let server = puffin_http::Server::new(&server_addr)?;
    profiling::puffin::set_scopes_on(true);
    info!("Profiler listening on {server_addr}");

    Ok(Some(ProfileServer { _server: server }))
}
