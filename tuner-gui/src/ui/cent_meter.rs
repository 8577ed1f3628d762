//! # Cent Meter Widget
//!
//! Horizontal meter showing how far the sung pitch sits from the nearest
//! semitone, with a colour-coded needle.

use iced::widget::canvas::{self, Geometry, Path, Stroke};
use iced::widget::container;
use iced::{Color, Element, Point, Rectangle, Renderer, Size, Theme, mouse};

/// The meter spans -50..=50 cents, i.e. half a semitone either way.
const METER_RANGE: f32 = 50.0;

/// Cent offsets that get a scale mark.
const SCALE_MARKS: [f32; 4] = [-25.0, -10.0, 10.0, 25.0];

/// Offsets counted as in tune.
const IN_TUNE_CENTS: i32 = 5;

/// Offsets counted as close.
const CLOSE_CENTS: i32 = 15;

pub struct CentMeter {
    /// Offset from the nearest semitone (None while nothing is sung)
    cents: Option<i32>,
}

impl CentMeter {
    pub fn new(cents: Option<i32>) -> Self {
        Self { cents }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(80.0)),
        )
        .into()
    }

    fn needle_color(cents: i32) -> Color {
        match cents.abs() {
            c if c <= IN_TUNE_CENTS => Color::from_rgb8(0x34, 0xDB, 0x98), // Green
            c if c <= CLOSE_CENTS => Color::from_rgb8(0xFF, 0xC3, 0x00),   // Yellow
            _ => Color::from_rgb8(0xFF, 0x33, 0x33),                       // Red
        }
    }
}

impl<Message> canvas::Program<Message> for CentMeter {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        let to_x = |cents: f32| (cents + METER_RANGE) / (2.0 * METER_RANGE) * bounds.width;

        let background = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&background, Color::from_rgb8(0x40, 0x40, 0x40));

        // In-tune band
        let band_left = to_x(-(IN_TUNE_CENTS as f32));
        let band = Path::rectangle(
            Point::new(band_left, 0.0),
            Size::new(to_x(IN_TUNE_CENTS as f32) - band_left, bounds.height),
        );
        frame.fill(&band, Color::from_rgba8(0x34, 0xDB, 0x98, 0.15));

        for mark in SCALE_MARKS {
            let x = to_x(mark);
            let tick = Path::line(
                Point::new(x, bounds.height * 0.7),
                Point::new(x, bounds.height),
            );
            frame.stroke(
                &tick,
                Stroke::default()
                    .with_width(1.0)
                    .with_color(Color::from_rgb8(0x90, 0x90, 0x90)),
            );
        }

        let center_x = to_x(0.0);
        let center_line = Path::line(
            Point::new(center_x, 0.0),
            Point::new(center_x, bounds.height),
        );
        frame.stroke(
            &center_line,
            Stroke::default().with_width(2.0).with_color(Color::WHITE),
        );

        if let Some(cents) = self.cents {
            let needle_x = to_x((cents as f32).clamp(-METER_RANGE, METER_RANGE));
            let needle = Path::rectangle(
                Point::new(needle_x - 2.0, 0.0),
                Size::new(4.0, bounds.height),
            );
            frame.fill(&needle, Self::needle_color(cents));
        }

        vec![frame.into_geometry()]
    }
}
