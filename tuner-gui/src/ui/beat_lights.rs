//! # Beat Lights Widget
//!
//! One lamp per beat of the cycle; the current beat is lit, beat 1 in an
//! accent colour.

use iced::widget::canvas::{self, Geometry, Path};
use iced::widget::container;
use iced::{Color, Element, Point, Rectangle, Renderer, Theme, mouse};

pub struct BeatLights {
    beats: u8,
    /// Beat to light, 1-based (None while stopped)
    active: Option<u8>,
}

impl BeatLights {
    pub fn new(beats: u8, active: Option<u8>) -> Self {
        Self { beats, active }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fixed(48.0)),
        )
        .into()
    }
}

impl<Message> canvas::Program<Message> for BeatLights {
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
        if self.beats == 0 || !bounds.width.is_finite() {
            return vec![frame.into_geometry()];
        }

        let slot = bounds.width / f32::from(self.beats);
        let radius = (slot * 0.35).min(bounds.height * 0.4);

        for beat in 1..=self.beats {
            let center = Point::new(slot * (f32::from(beat) - 0.5), bounds.height / 2.0);
            let color = match self.active {
                Some(active) if active == beat && beat == 1 => Color::from_rgb8(0xFF, 0x8C, 0x1A),
                Some(active) if active == beat => Color::from_rgb8(0x34, 0xDB, 0x98),
                _ => Color::from_rgb8(0x40, 0x40, 0x40),
            };
            frame.fill(&Path::circle(center, radius), color);
        }

        vec![frame.into_geometry()]
    }
}
