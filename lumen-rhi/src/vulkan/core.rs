//! Vulkan instance and adapter enumeration.

use std::ffi::{CStr, CString};
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use log::{debug, error, info, warn};
use crate::error::{GpuError, Result};
use crate::types::*;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Options used to create the Vulkan instance.
#[derive(Debug, Clone)]
pub struct InstanceDesc {
    pub app_name: String,
    pub validation: bool,
    /// Display the instance will present to; `None` creates an instance without surface extensions.
    pub display: Option<RawDisplayHandle>,
}

/// A physical device that met the minimum requirements.
#[derive(Clone)]
pub struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl PhysicalDevice {
    #[inline]
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn limits(&self) -> DeviceLimits {
        let limits = &self.properties.limits;
        DeviceLimits {
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
            max_texture_dimension_2d: limits.max_image_dimension2_d,
            max_bind_groups: limits.max_bound_descriptor_sets,
        }
    }
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// The loaded Vulkan library and instance.
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    surface_loader: Option<ash::khr::surface::Instance>,
    debug: Option<DebugMessenger>,
}

impl VulkanInstance {
    #[profiling::function]
    pub fn new(desc: &InstanceDesc) -> Result<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|err| GpuError::NoSuitableAdapter(format!("failed to load the Vulkan library: {err}")))?;

        let validation = desc.validation && has_validation_layer(&entry)?;
        if desc.validation && !validation {
            warn!("Validation requested but {} is not installed.", VALIDATION_LAYER.to_string_lossy());
        }

        let mut extensions: Vec<*const std::ffi::c_char> = match desc.display {
            Some(display) => ash_window::enumerate_required_extensions(display)?.to_vec(),
            None => Vec::new(),
        };
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let app_name = CString::new(desc.app_name.as_str())
            .map_err(|_| GpuError::config("gpu", "application name contains a NUL byte"))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"Lumen")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let layers = [VALIDATION_LAYER.as_ptr()];
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions);
        if validation {
            create_info = create_info.enabled_layer_names(&layers);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debug = if validation {
            match setup_debug_messenger(&entry, &instance) {
                Ok(debug) => Some(debug),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        let surface_loader = desc.display.map(|_| ash::khr::surface::Instance::new(&entry, &instance));

        info!("Vulkan instance created (validation: {validation}).");
        Ok(Self { entry, instance, surface_loader, debug })
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Surface functions, present when the instance was created for a display.
    #[inline]
    pub fn surface_loader(&self) -> Option<&ash::khr::surface::Instance> {
        self.surface_loader.as_ref()
    }

    /// Enumerate every Vulkan 1.3 capable physical device.
    pub fn enumerate_adapters(&self) -> Result<Vec<(PhysicalDevice, AdapterInfo)>> {
        let handles = unsafe { self.instance.enumerate_physical_devices()? };
        let mut adapters = Vec::with_capacity(handles.len());

        for handle in handles {
            let properties = unsafe { self.instance.get_physical_device_properties(handle) };
            let memory_properties = unsafe { self.instance.get_physical_device_memory_properties(handle) };
            let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned();

            if properties.api_version < vk::API_VERSION_1_3 {
                warn!("Skipping {name}: Vulkan 1.3 is required.");
                continue;
            }

            let families = unsafe { self.instance.get_physical_device_queue_family_properties(handle) };
            let queue_families = families
                .iter()
                .enumerate()
                .map(|(index, family)| QueueFamilyInfo {
                    index: index as u32,
                    capabilities: queue_capabilities(family.queue_flags),
                    queue_count: family.queue_count,
                })
                .collect();

            let vram_bytes = memory_properties.memory_heaps[..memory_properties.memory_heap_count as usize]
                .iter()
                .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                .map(|heap| heap.size)
                .sum();

            let info = AdapterInfo {
                name,
                kind: adapter_kind(properties.device_type),
                api_version: (
                    vk::api_version_major(properties.api_version),
                    vk::api_version_minor(properties.api_version),
                    vk::api_version_patch(properties.api_version),
                ),
                vram_bytes,
                queue_families,
            };
            debug!("Found adapter {} ({:?}).", info.name, info.kind);

            adapters.push((PhysicalDevice { handle, properties, memory_properties }, info));
        }

        Ok(adapters)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn has_validation_layer(entry: &Entry) -> Result<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER))
}

fn queue_capabilities(flags: vk::QueueFlags) -> QueueCapabilities {
    let mut caps = QueueCapabilities::empty();
    if flags.contains(vk::QueueFlags::GRAPHICS) {
        caps |= QueueCapability::Graphics;
    }
    if flags.contains(vk::QueueFlags::COMPUTE) {
        caps |= QueueCapability::Compute;
    }
    // graphics and compute queues implicitly support transfer
    if flags.intersects(vk::QueueFlags::TRANSFER | vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE) {
        caps |= QueueCapability::Transfer;
    }
    caps
}

fn adapter_kind(device_type: vk::PhysicalDeviceType) -> AdapterKind {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
        vk::PhysicalDeviceType::CPU => AdapterKind::Cpu,
        _ => AdapterKind::Other,
    }
}

fn setup_debug_messenger(entry: &Entry, instance: &Instance) -> Result<DebugMessenger> {
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
    Ok(DebugMessenger { loader, messenger })
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };
    if callback_data.p_message.is_null() {
        return vk::FALSE;
    }
    let message = unsafe { CStr::from_ptr(callback_data.p_message) }.to_string_lossy();

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        _ => "[Unknown]",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("Vulkan {type_str}: {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("Vulkan {type_str}: {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!("Vulkan {type_str}: {message}"),
        _ => log::trace!("Vulkan {type_str}: {message}"),
    }

    vk::FALSE
}
