use std::hash::{Hash, Hasher};

use ordered_float::OrderedFloat;

use super::number::fuzzy_equals;

/// The model a color was constructed in. Channel getters answer in the
/// construction model without round-tripping, so no precision is lost.
#[derive(Clone, Copy, Debug, PartialEq)]
enum ColorModel {
    Rgb,
    Hsl { hue: f64, saturation: f64, lightness: f64 },
    Hwb { hue: f64, whiteness: f64, blackness: f64 },
}

/// A SassScript color: rgb channels in [0, 255], alpha in [0, 1].
#[derive(Clone, Debug)]
pub struct Color {
    red: f64,
    green: f64,
    blue: f64,
    alpha: f64,
    model: ColorModel,
}

impl Color {
    pub fn rgb(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red: red.clamp(0.0, 255.0),
            green: green.clamp(0.0, 255.0),
            blue: blue.clamp(0.0, 255.0),
            alpha: alpha.clamp(0.0, 1.0),
            model: ColorModel::Rgb,
        }
    }

    /// Hue in degrees, saturation and lightness in [0, 100].
    pub fn hsl(hue: f64, saturation: f64, lightness: f64, alpha: f64) -> Self {
        let hue = hue.rem_euclid(360.0);
        let saturation = saturation.clamp(0.0, 100.0);
        let lightness = lightness.clamp(0.0, 100.0);
        let (red, green, blue) = hsl_to_rgb(hue, saturation / 100.0, lightness / 100.0);
        Self {
            red,
            green,
            blue,
            alpha: alpha.clamp(0.0, 1.0),
            model: ColorModel::Hsl { hue, saturation, lightness },
        }
    }

    /// Hue in degrees, whiteness and blackness in [0, 100].
    pub fn hwb(hue: f64, whiteness: f64, blackness: f64, alpha: f64) -> Self {
        let hue = hue.rem_euclid(360.0);
        let mut whiteness = whiteness.clamp(0.0, 100.0) / 100.0;
        let mut blackness = blackness.clamp(0.0, 100.0) / 100.0;
        // When white + black exceed 1 the channels scale proportionally.
        let sum = whiteness + blackness;
        if sum > 1.0 {
            whiteness /= sum;
            blackness /= sum;
        }
        let (red, green, blue) = hsl_to_rgb(hue, 1.0, 0.5);
        let scale = |channel: f64| (channel / 255.0 * (1.0 - whiteness - blackness) + whiteness) * 255.0;
        Self {
            red: scale(red),
            green: scale(green),
            blue: scale(blue),
            alpha: alpha.clamp(0.0, 1.0),
            model: ColorModel::Hwb {
                hue,
                whiteness: whiteness * 100.0,
                blackness: blackness * 100.0,
            },
        }
    }

    pub fn red(&self) -> f64 {
        self.red
    }

    pub fn green(&self) -> f64 {
        self.green
    }

    pub fn blue(&self) -> f64 {
        self.blue
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn hue(&self) -> f64 {
        match self.model {
            ColorModel::Hsl { hue, .. } | ColorModel::Hwb { hue, .. } => hue,
            ColorModel::Rgb => self.to_hsl().0,
        }
    }

    pub fn saturation(&self) -> f64 {
        match self.model {
            ColorModel::Hsl { saturation, .. } => saturation,
            _ => self.to_hsl().1,
        }
    }

    pub fn lightness(&self) -> f64 {
        match self.model {
            ColorModel::Hsl { lightness, .. } => lightness,
            _ => self.to_hsl().2,
        }
    }

    pub fn whiteness(&self) -> f64 {
        match self.model {
            ColorModel::Hwb { whiteness, .. } => whiteness,
            _ => self.red.min(self.green).min(self.blue) / 255.0 * 100.0,
        }
    }

    pub fn blackness(&self) -> f64 {
        match self.model {
            ColorModel::Hwb { blackness, .. } => blackness,
            _ => (1.0 - self.red.max(self.green).max(self.blue) / 255.0) * 100.0,
        }
    }

    /// (hue, saturation, lightness) with saturation/lightness in [0, 100].
    fn to_hsl(&self) -> (f64, f64, f64) {
        let red = self.red / 255.0;
        let green = self.green / 255.0;
        let blue = self.blue / 255.0;
        let max = red.max(green).max(blue);
        let min = red.min(green).min(blue);
        let delta = max - min;
        let lightness = (max + min) / 2.0;
        if delta == 0.0 {
            return (0.0, 0.0, lightness * 100.0);
        }
        let saturation = if lightness > 0.5 {
            delta / (2.0 - max - min)
        } else {
            delta / (max + min)
        };
        let hue = if max == red {
            ((green - blue) / delta).rem_euclid(6.0)
        } else if max == green {
            (blue - red) / delta + 2.0
        } else {
            (red - green) / delta + 4.0
        } * 60.0;
        (hue, saturation * 100.0, lightness * 100.0)
    }

    pub(crate) fn rounded_channels(&self) -> (u8, u8, u8) {
        (
            self.red.round() as u8,
            self.green.round() as u8,
            self.blue.round() as u8,
        )
    }
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (f64, f64, f64) {
    if saturation == 0.0 {
        let channel = lightness * 255.0;
        return (channel, channel, channel);
    }
    let q = if lightness < 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;
    let channel = |mut t: f64| {
        t = t.rem_euclid(1.0);
        let value = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        };
        value * 255.0
    };
    let third = 1.0 / 3.0;
    (
        channel(hue / 360.0 + third),
        channel(hue / 360.0),
        channel(hue / 360.0 - third),
    )
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        fuzzy_equals(self.red, other.red)
            && fuzzy_equals(self.green, other.green)
            && fuzzy_equals(self.blue, other.blue)
            && fuzzy_equals(self.alpha, other.alpha)
    }
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for channel in [self.red, self.green, self.blue, self.alpha] {
            OrderedFloat((channel * 1e8).round()).hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsl_round_trips_through_rgb() {
        let color = Color::hsl(120.0, 50.0, 50.0, 1.0);
        assert!(fuzzy_equals(color.hue(), 120.0));
        assert!(fuzzy_equals(color.saturation(), 50.0));
        assert!(fuzzy_equals(color.lightness(), 50.0));
    }

    #[test]
    fn equal_colors_compare_across_models() {
        let red = Color::rgb(255.0, 0.0, 0.0, 1.0);
        let hsl_red = Color::hsl(0.0, 100.0, 50.0, 1.0);
        assert_eq!(red, hsl_red);
    }

    #[test]
    fn hwb_white_is_white() {
        let white = Color::hwb(0.0, 100.0, 0.0, 1.0);
        assert_eq!(white.rounded_channels(), (255, 255, 255));
    }
}
