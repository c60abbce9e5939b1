//! End-to-end checks of device selection and swapchain parameter choice,
//! driven through the pure decision functions so no GPU is needed.

use ash::vk;
use triangle_rhi::RhiError;
use triangle_rhi::buffer::{select_vertex_memory_type, vertex_buffer_size};
use triangle_rhi::physical_device::{
    Rejection, check_suitability, find_memory_type, required_device_extensions,
    resolve_queue_families,
};
use triangle_rhi::swapchain::{
    SwapchainSupportDetails, choose_extent, choose_present_mode, choose_surface_format,
    determine_image_count, sharing_config,
};

fn single_family_adapter() -> Vec<vk::QueueFamilyProperties> {
    vec![vk::QueueFamilyProperties {
        queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
        queue_count: 1,
        ..Default::default()
    }]
}

fn bgra_fifo_support() -> SwapchainSupportDetails {
    SwapchainSupportDetails {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        },
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO],
    }
}

#[test]
fn test_single_adapter_is_selected_with_exclusive_sharing() {
    let families = single_family_adapter();
    let indices = resolve_queue_families(&families, |i| i == 0);

    assert_eq!(indices.graphics_family, Some(0));
    assert_eq!(indices.present_family, Some(0));

    let required = required_device_extensions();
    let support = check_suitability(&indices, &required, &required, || Ok(bgra_fifo_support()))
        .expect("adapter should be suitable");

    let (sharing_mode, family_list) = sharing_config(&indices);
    assert_eq!(sharing_mode, vk::SharingMode::EXCLUSIVE);
    assert!(family_list.is_empty());

    let format = choose_surface_format(&support.formats).unwrap();
    assert_eq!(format.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);

    assert_eq!(
        choose_present_mode(&support.present_modes),
        vk::PresentModeKHR::FIFO
    );

    let extent = choose_extent(&support.capabilities, 1024, 768);
    assert_eq!(extent.width, 800);
    assert_eq!(extent.height, 600);

    let image_count = determine_image_count(&support.capabilities);
    assert!(image_count >= support.capabilities.min_image_count);
}

#[test]
fn test_adapter_without_swapchain_extension_is_rejected() {
    let families = single_family_adapter();
    let indices = resolve_queue_families(&families, |_| true);
    let required = required_device_extensions();

    let result = check_suitability(&indices, &[], &required, || Ok(bgra_fifo_support()));

    assert!(matches!(result, Err(Rejection::MissingExtension(_))));
}

#[test]
fn test_surface_without_present_modes_is_rejected() {
    let families = single_family_adapter();
    let indices = resolve_queue_families(&families, |_| true);
    let required = required_device_extensions();

    let result = check_suitability(&indices, &required, &required, || {
        let mut support = bgra_fifo_support();
        support.present_modes.clear();
        Ok(support)
    });

    assert!(matches!(
        result,
        Err(Rejection::InadequateSwapchainSupport {
            formats: 1,
            present_modes: 0
        })
    ));
}

#[test]
fn test_vertex_memory_with_only_device_local_types_fails() {
    let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: 2,
        ..Default::default()
    };
    memory_properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    memory_properties.memory_types[1].property_flags =
        vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;

    // A two-vertex buffer whose allowed types are both missing HOST_COHERENT
    let requirements = vk::MemoryRequirements {
        size: vertex_buffer_size(2),
        alignment: 4,
        memory_type_bits: 0b11,
    };

    let err = select_vertex_memory_type(&memory_properties, &requirements).unwrap_err();
    match err {
        RhiError::NoSuitableMemoryType { type_filter, flags } => {
            assert_eq!(type_filter, 0b11);
            assert!(flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
            assert!(flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
        }
        other => panic!("expected NoSuitableMemoryType, got {other:?}"),
    }

    // The same table does serve a device-local request
    assert_eq!(
        find_memory_type(
            &memory_properties,
            0b11,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        )
        .unwrap(),
        0
    );
}
