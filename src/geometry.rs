/*
 * DPI scaling and window placement math. Pure functions: the native layer
 * supplies the DPI, screen size, work area and the non-client adjustment, so
 * every rule here is tested without a display.
 */
use crate::error::Result as PlatformResult;
use crate::types::{Point, Rect, Size};

pub const BASE_DPI: u32 = 96;

/// `MulDiv` semantics: 64-bit intermediate, rounded half away from zero.
pub fn mul_div(number: i32, numerator: i32, denominator: i32) -> i32 {
    if denominator == 0 {
        return -1;
    }
    let product = i64::from(number) * i64::from(numerator);
    let denominator = i64::from(denominator);
    let half = denominator.abs() / 2;
    let rounded = if (product < 0) != (denominator < 0) {
        (product - half) / denominator
    } else {
        (product + half) / denominator
    };
    rounded.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Scale a length defined at 96 DPI to `dpi`.
pub fn scale(px: i32, dpi: u32) -> i32 {
    mul_div(px, dpi as i32, BASE_DPI as i32)
}

pub fn scale_size(size: Size, dpi: u32) -> Size {
    Size::new(scale(size.cx, dpi), scale(size.cy, dpi))
}

/// Top-left corner that centres `size` within `outer`.
pub fn center_in(outer: Rect, size: Size) -> Point {
    Point::new(
        outer.left + outer.width() / 2 - size.cx / 2,
        outer.top + outer.height() / 2 - size.cy / 2,
    )
}

/*
 * Moves `frame` (without resizing) so it lies inside `area`. When the frame is
 * larger than the area, the left/top edges win so the caption stays reachable.
 */
pub fn clamp_into(frame: Rect, area: Rect) -> Rect {
    let mut rc = frame;
    if rc.right > area.right {
        rc = rc.offset(area.right - rc.right, 0);
    }
    if rc.left < area.left {
        rc = rc.offset(area.left - rc.left, 0);
    }
    if rc.bottom > area.bottom {
        rc = rc.offset(0, area.bottom - rc.bottom);
    }
    if rc.top < area.top {
        rc = rc.offset(0, area.top - rc.top);
    }
    rc
}

/// Geometry computed once when a window is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub dpi: u32,
    /// Requested client size, 96-DPI relative.
    pub logical_client: Size,
    /// Client size in device pixels.
    pub physical_client: Size,
    /// Outer window rectangle (chrome included) in screen coordinates.
    pub frame: Rect,
}

/*
 * Main window placement: scale the client area, centre it on the screen,
 * grow it by the non-client chrome via `adjust`, then keep it in the work area.
 */
pub fn main_window_geometry(
    logical_client: Size,
    dpi: u32,
    screen: Size,
    work_area: Rect,
    adjust: impl FnOnce(Rect) -> PlatformResult<Rect>,
) -> PlatformResult<WindowGeometry> {
    let physical_client = scale_size(logical_client, dpi);
    let origin = center_in(Rect::new(0, 0, screen.cx, screen.cy), physical_client);
    let client_rect = Rect::from_origin_size(origin, physical_client);
    let frame = clamp_into(adjust(client_rect)?, work_area);
    Ok(WindowGeometry {
        dpi,
        logical_client,
        physical_client,
        frame,
    })
}

/// Where a modal goes: centred over its owner's window rectangle, kept in the work area.
pub fn modal_position(modal: Rect, owner: Rect, work_area: Rect) -> Point {
    let origin = center_in(owner, modal.size());
    clamp_into(Rect::from_origin_size(origin, modal.size()), work_area).origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Chrome used by the headless layer: 8 px borders, 31 px caption.
    fn chrome(rc: Rect) -> PlatformResult<Rect> {
        Ok(Rect::new(rc.left - 8, rc.top - 31, rc.right + 8, rc.bottom + 8))
    }

    #[test]
    fn mul_div_rounds_half_away_from_zero() {
        assert_eq!(mul_div(5, 1, 2), 3);
        assert_eq!(mul_div(-5, 1, 2), -3);
        assert_eq!(mul_div(500, 120, 96), 625);
        assert_eq!(mul_div(1, 144, 96), 2);
        assert_eq!(mul_div(7, 3, 0), -1);
    }

    #[test]
    fn scale_matches_rounded_ratio_for_common_dpis() {
        for dpi in [96_u32, 120, 144, 168, 192] {
            for px in [0_i32, 1, 15, 150, 200, 270, 400, 599, 600] {
                let expected = (f64::from(px) * f64::from(dpi) / 96.0).round() as i32;
                assert_eq!(scale(px, dpi), expected, "px {px} at dpi {dpi}");
            }
        }
    }

    #[test]
    fn main_window_is_centred_horizontally_within_a_pixel() {
        let screen = Size::new(1920, 1080);
        let work = Rect::new(0, 0, 1920, 1040);
        for dpi in [96_u32, 120, 144] {
            for client in [Size::new(500, 400), Size::new(600, 270), Size::new(333, 111)] {
                let geo = main_window_geometry(client, dpi, screen, work, chrome)
                    .expect("geometry");
                assert_eq!(geo.physical_client, scale_size(client, dpi));
                assert_eq!(geo.frame.width(), geo.physical_client.cx + 16);
                assert_eq!(geo.frame.height(), geo.physical_client.cy + 39);
                let centre = geo.frame.left + geo.frame.width() / 2;
                assert!((centre - screen.cx / 2).abs() <= 1, "centre {centre} at dpi {dpi}");
            }
        }
    }

    #[test]
    fn oversized_window_keeps_title_bar_in_work_area() {
        let geo = main_window_geometry(
            Size::new(2000, 1100),
            96,
            Size::new(1920, 1080),
            Rect::new(0, 0, 1920, 1040),
            chrome,
        )
        .expect("geometry");
        assert_eq!(geo.frame.left, 0);
        assert_eq!(geo.frame.top, 0);
        assert_eq!(geo.frame.size(), Size::new(2016, 1139));
    }

    #[test]
    fn adjust_failure_propagates() {
        let result = main_window_geometry(
            Size::new(10, 10),
            96,
            Size::new(100, 100),
            Rect::new(0, 0, 100, 100),
            |_| Err(crate::error::PlatformError::OperationFailed("adjust".into())),
        );
        assert!(result.is_err());
    }

    #[test]
    fn modal_is_centred_over_owner() {
        let pos = modal_position(
            Rect::new(0, 0, 200, 150),
            Rect::new(100, 100, 500, 400),
            Rect::new(0, 0, 1920, 1040),
        );
        assert_eq!(pos, Point::new(200, 175));
    }

    #[test]
    fn modal_near_screen_edge_is_pulled_back_inside() {
        let pos = modal_position(
            Rect::new(0, 0, 300, 200),
            Rect::new(1800, 950, 1920, 1040),
            Rect::new(0, 0, 1920, 1040),
        );
        assert_eq!(pos, Point::new(1620, 840));
    }
}
