//! Visualization of pupil detection and calibration prompts.
//!
//! Nothing in here feeds back into estimation; these functions only consume already computed
//! results.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
    text::Text,
};
use image::{GrayImage, Rgb, RgbImage};

use crate::{calibration::Prompt, gaze::GazeReading, resolution::Resolution, screen::ScreenPoint};

const PUPIL_COLOR: Rgb888 = Rgb888::new(0, 255, 0);
const TARGET_COLOR: Rgb888 = Rgb888::new(255, 0, 0);
const ESTIMATE_COLOR: Rgb888 = Rgb888::new(170, 170, 170);
const BACKGROUND: u8 = 50;

/// Half the length of a pupil cross arm, in pixels.
const CROSS_ARM: i32 = 5;
/// Radius of calibration target dots, in pixels.
pub const TARGET_RADIUS: u32 = 20;

/// Returns a color copy of `frame` with the located pupils marked by green crosses.
pub fn annotate_pupils(frame: &GrayImage, reading: Option<&GazeReading>) -> RgbImage {
    let mut image = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let v = frame.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });

    if let Some(reading) = reading {
        let mut target = Target(&mut image);
        for (x, y) in [reading.pupil_left_coords(), reading.pupil_right_coords()]
            .into_iter()
            .flatten()
        {
            draw_cross(&mut target, x, y);
        }
    }

    image
}

/// Renders the calibration screen for `prompt` on a `screen`-sized canvas.
///
/// `estimate`, if given, is drawn as a small grey dot (used while testing the calibration).
pub fn render_prompt(
    screen: Resolution,
    prompt: Option<Prompt>,
    estimate: Option<ScreenPoint>,
) -> RgbImage {
    let mut image = RgbImage::from_pixel(
        screen.width(),
        screen.height(),
        Rgb([BACKGROUND, BACKGROUND, BACKGROUND]),
    );
    let mut target = Target(&mut image);

    match prompt {
        Some(Prompt::Instructions) => {
            let style = MonoTextStyle::new(&FONT_10X20, TARGET_COLOR);
            unwrap_infallible(
                Text::new("Please fixate on the red dots", Point::new(80, 200), style)
                    .draw(&mut target),
            );
        }
        Some(Prompt::Target { point, .. }) => {
            unwrap_infallible(
                Circle::with_center(Point::new(point.x, point.y), TARGET_RADIUS * 2 + 1)
                    .into_styled(PrimitiveStyle::with_fill(TARGET_COLOR))
                    .draw(&mut target),
            );
        }
        None => {}
    }

    if let Some(est) = estimate {
        unwrap_infallible(
            Circle::with_center(Point::new(est.x, est.y), TARGET_RADIUS / 2 + 1)
                .into_styled(PrimitiveStyle::with_fill(ESTIMATE_COLOR))
                .draw(&mut target),
        );
    }

    image
}

fn draw_cross(target: &mut Target<'_>, x: i32, y: i32) {
    let style = PrimitiveStyle::with_stroke(PUPIL_COLOR, 1);
    unwrap_infallible(
        Line::new(Point::new(x - CROSS_ARM, y), Point::new(x + CROSS_ARM, y))
            .into_styled(style)
            .draw(target),
    );
    unwrap_infallible(
        Line::new(Point::new(x, y - CROSS_ARM), Point::new(x, y + CROSS_ARM))
            .into_styled(style)
            .draw(target),
    );
}

fn unwrap_infallible<T>(res: Result<T, Infallible>) -> T {
    match res {
        Ok(t) => t,
        Err(infallible) => match infallible {},
    }
}

struct Target<'a>(&'a mut RgbImage);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = (self.0.width(), self.0.height());

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                self.0.put_pixel(
                    pos.x as u32,
                    pos.y as u32,
                    Rgb([color.r(), color.g(), color.b()]),
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::Luma;

    use super::*;
    use crate::{
        eye::{Eye, EyeConfig},
        gaze::{Bands, EyeReading},
        image::Frame,
        landmark::{EyeSide, Landmark, Landmarks},
    };

    #[test]
    fn test_annotate_pupils() {
        let mut img = GrayImage::from_pixel(200, 100, Luma([230]));
        for (px, py) in [(60, 50), (140, 50)] {
            for y in py - 4..=py + 4 {
                for x in px - 4..=px + 4 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        let frame = Frame::new(img, Duration::ZERO);

        let mut lms = Landmarks::new();
        for (side, cx) in [(EyeSide::Left, 60.0), (EyeSide::Right, 140.0)] {
            let pts = [
                [cx - 30.0, 50.0],
                [cx - 10.0, 38.0],
                [cx + 10.0, 38.0],
                [cx + 30.0, 50.0],
                [cx + 10.0, 62.0],
                [cx - 10.0, 62.0],
            ];
            for (i, p) in side.landmark_indices().zip(pts) {
                lms.set(i, Landmark::new(p));
            }
        }
        let [left, right] = EyeSide::BOTH.map(|side| {
            Eye::isolate(&frame, &lms, side, &EyeConfig::default())
                .map(|eye| EyeReading::new(eye, 20))
        });
        let reading = GazeReading::new(left, right, Bands::default());

        let annotated = annotate_pupils(frame.image(), Some(&reading));
        for coords in [reading.pupil_left_coords(), reading.pupil_right_coords()] {
            let (x, y) = coords.unwrap();
            assert_eq!(annotated.get_pixel(x as u32, y as u32), &Rgb([0, 255, 0]));
            assert_eq!(
                annotated.get_pixel((x + CROSS_ARM) as u32, y as u32),
                &Rgb([0, 255, 0])
            );
        }
        // untouched pixels keep their gray value
        assert_eq!(annotated.get_pixel(0, 0), &Rgb([230; 3]));

        let plain = annotate_pupils(frame.image(), None);
        assert_eq!(plain.get_pixel(60, 50), &Rgb([0; 3]));
    }

    #[test]
    fn test_render_target() {
        let prompt = Prompt::Target {
            point: ScreenPoint::new(50, 40),
            recording: true,
        };
        let image = render_prompt(Resolution::new(100, 80), Some(prompt), None);
        assert_eq!(image.get_pixel(50, 40), &Rgb([255, 0, 0]));
        assert_eq!(image.get_pixel(0, 0), &Rgb([BACKGROUND; 3]));
    }

    #[test]
    fn test_render_estimate_offscreen() {
        let image = render_prompt(
            Resolution::new(10, 10),
            None,
            Some(ScreenPoint::new(-100, -100)),
        );
        assert_eq!(image.get_pixel(5, 5), &Rgb([BACKGROUND; 3]));
    }
}
