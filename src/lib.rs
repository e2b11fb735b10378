#![allow(clippy::missing_safety_doc)]
#![warn(missing_docs)]
/*!
Bootstrap phase of a Vulkan renderer, built on [`ash`].

- ✅ Instance creation, validation layers and debug messenger
- ✅ Physical device enumeration and selection
- ✅ Queue family resolution per required capability
- ✅ Logical device creation
- ✅ Getting queues
- ✅ Ordered teardown of everything above

The selection core ([`DeviceSelector`], [`resolve_queue_families`],
[`LogicalDeviceBuilder`]) only talks to the driver through the [`Backend`]
and [`DeviceFactory`] traits, [`AshBackend`] implements them for a real
instance.

## Cargo Features

- `surface` (enabled by default): Enables the use of [`raw-window-handle`]
  and [`RendererSession`].

## Example

```rust,ignore
let config = RendererConfig::default().apply_env()?;
let session = RendererSession::new(&config, &window)?;

let graphics = session.device().graphics_queue().unwrap();
let present = session.device().present_queue().unwrap();
```

Or, step by step:

```rust,ignore
let mut backend = AshBackend::new(&instance, &surface_loader);
let selected = DeviceSelector::graphics_present(surface)
    .require_extension(ash::extensions::khr::Swapchain::name())
    .select(&backend)?;
let device = LogicalDeviceBuilder::new()
    .mirror_instance_layers(&instance_metadata)
    .build(&mut backend, &selected)?;
```

## Licensing

This project is licensed under the zlib License.

[`raw-window-handle`]: https://crates.io/crates/raw-window-handle
*/

pub mod backend;
pub mod capability;
pub mod config;
pub mod device;
pub mod instance;
pub mod queue_family;
pub mod selector;
#[cfg(feature = "surface")]
pub mod session;

pub use backend::*;
pub use capability::*;
pub use config::*;
pub use device::*;
pub use instance::*;
pub use queue_family::*;
pub use selector::*;
#[cfg(feature = "surface")]
pub use session::*;

type BootstrapSmallVec<T> = smallvec::SmallVec<[T; 8]>;
