use ash::{vk, Entry};
use renderer_bootstrap::{DebugMessenger, InstanceBuilder, ValidationLayers};
use std::ffi::CString;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let entry = unsafe { Entry::load() }.unwrap();
    let instance_builder = InstanceBuilder::new()
        .validation_layers(ValidationLayers::Request)
        .request_debug_messenger(DebugMessenger::Default)
        .debug_message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        );
    let (instance, debug_messenger, metadata) =
        unsafe { instance_builder.build(&entry) }.unwrap();

    unsafe {
        if let Some(debug_messenger) = &debug_messenger {
            let message = CString::new(format!("{:#?}", metadata)).unwrap();
            debug_messenger.loader().submit_debug_utils_message(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &vk::DebugUtilsMessengerCallbackDataEXT::builder()
                    .message(message.as_c_str())
                    .build(),
            );
        }

        if let Some(debug_messenger) = debug_messenger {
            debug_messenger.destroy();
        }

        instance.destroy_instance(None);
    }
}
