//! Reduction of winit window events to what the renderer reacts to.

use winit::event::WindowEvent;

/// Window events the render loop acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The user asked to close the window.
    QuitRequested,
    /// The drawable size changed. Either dimension may be zero while minimized.
    Resized { width: u32, height: u32 },
    /// The window wants a new frame.
    RedrawRequested,
}

/// Classify a winit event; `None` for events the renderer ignores.
pub fn classify_event(event: &WindowEvent) -> Option<SurfaceEvent> {
    match event {
        WindowEvent::CloseRequested | WindowEvent::Destroyed => Some(SurfaceEvent::QuitRequested),
        WindowEvent::Resized(size) => Some(SurfaceEvent::Resized {
            width: size.width,
            height: size.height,
        }),
        WindowEvent::RedrawRequested => Some(SurfaceEvent::RedrawRequested),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn test_close_requested_quits() {
        assert_eq!(
            classify_event(&WindowEvent::CloseRequested),
            Some(SurfaceEvent::QuitRequested)
        );
        assert_eq!(
            classify_event(&WindowEvent::Destroyed),
            Some(SurfaceEvent::QuitRequested)
        );
    }

    #[test]
    fn test_resize_carries_size() {
        let event = WindowEvent::Resized(PhysicalSize::new(1024, 768));
        assert_eq!(
            classify_event(&event),
            Some(SurfaceEvent::Resized {
                width: 1024,
                height: 768
            })
        );
    }

    #[test]
    fn test_minimize_reports_zero_size() {
        let event = WindowEvent::Resized(PhysicalSize::new(0, 0));
        assert_eq!(
            classify_event(&event),
            Some(SurfaceEvent::Resized {
                width: 0,
                height: 0
            })
        );
    }

    #[test]
    fn test_redraw_requested() {
        assert_eq!(
            classify_event(&WindowEvent::RedrawRequested),
            Some(SurfaceEvent::RedrawRequested)
        );
    }

    #[test]
    fn test_unrelated_events_ignored() {
        assert_eq!(classify_event(&WindowEvent::Focused(true)), None);
        assert_eq!(classify_event(&WindowEvent::Occluded(false)), None);
    }
}
