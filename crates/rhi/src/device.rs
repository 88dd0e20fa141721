//! Logical device, queues and the GPU memory allocator.

use std::ffi::c_char;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{AdapterCapabilities, QueueFamilies, REQUIRED_DEVICE_EXTENSIONS};

/// Vulkan logical device.
///
/// Shared through `Arc` by every object that must destroy child handles.
/// The allocator lives behind a `Mutex` and is torn down before the device.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    adapter: AdapterCapabilities,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl Device {
    /// Creates the logical device on the selected adapter.
    ///
    /// One queue is created per unique family. Sampler anisotropy is the only
    /// optional feature enabled; selection already guaranteed it.
    pub fn new(instance: &Instance, adapter: &AdapterCapabilities) -> RhiResult<Arc<Self>> {
        let families = adapter.queue_families;
        let unique_families = families.unique();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(families = ?unique_families, "Creating device queues");

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let extension_names: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        // SAFETY: the adapter was enumerated from this instance and every
        // pointer in create_info outlives the call.
        let device = unsafe {
            instance
                .handle()
                .create_device(adapter.device, &create_info, None)?
        };

        // SAFETY: one queue was requested for each of these families.
        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
            )
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: adapter.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: nothing has been created from the device yet.
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!(device = adapter.device_name(), "Logical device created");

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            adapter: adapter.clone(),
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn adapter(&self) -> &AdapterCapabilities {
        &self.adapter
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.adapter.device
    }

    #[inline]
    pub fn queue_families(&self) -> QueueFamilies {
        self.adapter.queue_families
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Locks the memory allocator.
    pub fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator.lock().map_err(|_| RhiError::AllocatorPoisoned)
    }

    /// Blocks until every queue is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        // SAFETY: the device is alive for &self.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits to the graphics queue.
    ///
    /// # Safety
    ///
    /// Command buffers must be fully recorded and every semaphore and fence
    /// referenced must be in a state that permits the submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Blocks until the graphics queue is idle.
    pub fn graphics_queue_wait_idle(&self) -> RhiResult<()> {
        // SAFETY: the queue belongs to this device.
        unsafe { self.device.queue_wait_idle(self.graphics_queue)? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: every object created from this device is owned by a wrapper
        // holding an Arc<Device>, so none remain once this runs. The allocator
        // frees its memory blocks through the device and must go first.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {e:?}");
            }
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: ash::Device is a function table plus a handle, queues are plain
// handles, and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
