// asset/font.rs
// Typeface JSON fonts: per-glyph advance plus an outline command string.

use std::collections::HashMap;

use glam::Vec2;
use serde::Deserialize;

use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlineCommand {
    MoveTo(Vec2),
    LineTo(Vec2),
    QuadTo { ctrl: Vec2, to: Vec2 },
    CubicTo { ctrl1: Vec2, ctrl2: Vec2, to: Vec2 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    /// Horizontal advance in font units.
    pub advance: f32,
    pub commands: Vec<OutlineCommand>,
}

impl Glyph {
    /// Flattens the outline into closed contours, scaled and offset into text space.
    pub fn contours(&self, scale: f32, offset: Vec2, curve_segments: u32) -> Vec<Vec<Vec2>> {
        let segments = curve_segments.max(1);
        let mut contours: Vec<Vec<Vec2>> = Vec::new();
        let mut current: Vec<Vec2> = Vec::new();
        let mut cursor = Vec2::ZERO;
        let map = |p: Vec2| p * scale + offset;

        for command in &self.commands {
            match *command {
                OutlineCommand::MoveTo(p) => {
                    if current.len() >= 3 {
                        contours.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                    cursor = p;
                    current.push(map(p));
                }
                OutlineCommand::LineTo(p) => {
                    cursor = p;
                    current.push(map(p));
                }
                OutlineCommand::QuadTo { ctrl, to } => {
                    let from = cursor;
                    for i in 1..=segments {
                        let t = i as f32 / segments as f32;
                        let mt = 1.0 - t;
                        let p = from * (mt * mt) + ctrl * (2.0 * mt * t) + to * (t * t);
                        current.push(map(p));
                    }
                    cursor = to;
                }
                OutlineCommand::CubicTo { ctrl1, ctrl2, to } => {
                    let from = cursor;
                    for i in 1..=segments {
                        let t = i as f32 / segments as f32;
                        let mt = 1.0 - t;
                        let p = from * (mt * mt * mt)
                            + ctrl1 * (3.0 * mt * mt * t)
                            + ctrl2 * (3.0 * mt * t * t)
                            + to * (t * t * t);
                        current.push(map(p));
                    }
                    cursor = to;
                }
            }
        }

        if current.len() >= 3 {
            contours.push(current);
        }

        for contour in &mut contours {
            dedup_closing_point(contour);
        }
        contours.retain(|c| c.len() >= 3);
        contours
    }
}

fn dedup_closing_point(contour: &mut Vec<Vec2>) {
    contour.dedup_by(|a, b| a.distance_squared(*b) < 1e-12);
    while contour.len() > 1 {
        let first = contour[0];
        let last = contour[contour.len() - 1];
        if first.distance_squared(last) < 1e-12 {
            contour.pop();
        } else {
            break;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Font {
    pub family: String,
    /// Font units per em.
    pub resolution: f32,
    /// Distance between baselines in font units.
    pub line_height: f32,
    pub glyphs: HashMap<char, Glyph>,
}

#[derive(Deserialize)]
struct TypefaceJson {
    glyphs: HashMap<String, GlyphJson>,
    resolution: f32,
    #[serde(rename = "familyName", default)]
    family_name: String,
    #[serde(rename = "boundingBox")]
    bounding_box: BoundingBoxJson,
    #[serde(rename = "underlineThickness", default)]
    underline_thickness: f32,
}

#[derive(Deserialize)]
struct GlyphJson {
    ha: f32,
    #[serde(default)]
    o: Option<String>,
}

#[derive(Deserialize)]
struct BoundingBoxJson {
    #[serde(rename = "yMin")]
    y_min: f32,
    #[serde(rename = "yMax")]
    y_max: f32,
}

impl Font {
    pub fn parse(label: &str, bytes: &[u8]) -> Result<Self, LoadError> {
        let json: TypefaceJson =
            serde_json::from_slice(bytes).map_err(|err| LoadError::decode(label, err))?;

        if !(json.resolution > 0.0) {
            return Err(LoadError::decode(label, "font resolution must be positive"));
        }

        let mut glyphs = HashMap::with_capacity(json.glyphs.len());
        for (key, glyph) in json.glyphs {
            let mut chars = key.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                log::debug!("Skipping multi-character glyph key {:?} in {}", key, label);
                continue;
            };
            let commands = match glyph.o.as_deref() {
                Some(outline) => parse_outline(outline)
                    .map_err(|reason| LoadError::decode(label, format!("glyph {:?}: {}", ch, reason)))?,
                None => Vec::new(),
            };
            glyphs.insert(
                ch,
                Glyph {
                    advance: glyph.ha,
                    commands,
                },
            );
        }

        Ok(Self {
            family: json.family_name,
            resolution: json.resolution,
            line_height: json.bounding_box.y_max - json.bounding_box.y_min
                + json.underline_thickness,
            glyphs,
        })
    }

    pub fn glyph(&self, ch: char) -> Option<&Glyph> {
        self.glyphs.get(&ch)
    }
}

fn parse_outline(outline: &str) -> Result<Vec<OutlineCommand>, String> {
    let tokens: Vec<&str> = outline.split_whitespace().collect();
    let mut commands = Vec::new();
    let mut i = 0;

    let point = |i: &mut usize| -> Result<Vec2, String> {
        let x = number(tokens.get(*i))?;
        let y = number(tokens.get(*i + 1))?;
        *i += 2;
        Ok(Vec2::new(x, y))
    };

    while i < tokens.len() {
        let op = tokens[i];
        i += 1;
        let command = match op {
            "m" => OutlineCommand::MoveTo(point(&mut i)?),
            "l" => OutlineCommand::LineTo(point(&mut i)?),
            // Typeface outlines list the end point before the control points.
            "q" => {
                let to = point(&mut i)?;
                let ctrl = point(&mut i)?;
                OutlineCommand::QuadTo { ctrl, to }
            }
            "b" => {
                let to = point(&mut i)?;
                let ctrl1 = point(&mut i)?;
                let ctrl2 = point(&mut i)?;
                OutlineCommand::CubicTo { ctrl1, ctrl2, to }
            }
            "z" => continue,
            other => return Err(format!("unknown outline command '{}'", other)),
        };
        commands.push(command);
    }

    Ok(commands)
}

fn number(token: Option<&&str>) -> Result<f32, String> {
    let token = token.ok_or_else(|| "truncated outline".to_string())?;
    token
        .parse::<f32>()
        .map_err(|err| format!("bad number '{}': {}", token, err))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One glyph: a 100-unit square with a 50-unit square hole.
    pub(crate) const SQUARE_FONT: &str = r#"{
        "familyName": "Test",
        "resolution": 100,
        "boundingBox": { "xMin": 0, "xMax": 100, "yMin": -20, "yMax": 100 },
        "underlineThickness": 10,
        "glyphs": {
            "A": { "ha": 120, "o": "m 0 0 l 0 100 l 100 100 l 100 0 l 0 0 m 25 25 l 75 25 l 75 75 l 25 75 l 25 25" },
            " ": { "ha": 60 },
            "Q": { "ha": 100, "o": "m 0 0 q 100 0 50 50 l 0 100" }
        }
    }"#;

    #[test]
    fn parses_glyphs_and_metrics() {
        let font = Font::parse("test.json", SQUARE_FONT.as_bytes()).unwrap();
        assert_eq!(font.family, "Test");
        assert_eq!(font.resolution, 100.0);
        assert_eq!(font.line_height, 130.0);
        assert_eq!(font.glyph('A').unwrap().commands.len(), 10);
        assert!(font.glyph(' ').unwrap().commands.is_empty());
    }

    #[test]
    fn quadratic_end_point_precedes_control_point() {
        let font = Font::parse("test.json", SQUARE_FONT.as_bytes()).unwrap();
        let q = font.glyph('Q').unwrap();
        assert_eq!(
            q.commands[1],
            OutlineCommand::QuadTo {
                ctrl: Vec2::new(50.0, 50.0),
                to: Vec2::new(100.0, 0.0)
            }
        );
    }

    #[test]
    fn contours_are_split_scaled_and_unclosed() {
        let font = Font::parse("test.json", SQUARE_FONT.as_bytes()).unwrap();
        let contours = font
            .glyph('A')
            .unwrap()
            .contours(0.01, Vec2::new(1.0, 0.0), 4);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].len(), 4);
        assert_eq!(contours[0][2], Vec2::new(2.0, 1.0));
    }

    #[test]
    fn curves_are_subdivided() {
        let font = Font::parse("test.json", SQUARE_FONT.as_bytes()).unwrap();
        let contours = font.glyph('Q').unwrap().contours(1.0, Vec2::ZERO, 4);
        // start + 4 curve points + final line point
        assert_eq!(contours[0].len(), 6);
    }

    #[test]
    fn malformed_outline_is_a_decode_error() {
        let json = r#"{ "resolution": 100, "boundingBox": {"yMin": 0, "yMax": 1},
            "glyphs": { "x": { "ha": 1, "o": "m 0" } } }"#;
        assert!(matches!(
            Font::parse("bad.json", json.as_bytes()),
            Err(LoadError::Decode { .. })
        ));
    }
}
