//! Minimal PLY reader: pulls vertex positions (and colours when present)
//! out of ascii and binary PLY files for the turntable view.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

const END_HEADER: &[u8] = b"end_header";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<[f32; 3]>,
    pub colors: Option<Vec<[u8; 3]>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

/// Scalar property types from the PLY header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl ScalarType {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "char" | "int8" => Self::Int8,
            "uchar" | "uint8" => Self::UInt8,
            "short" | "int16" => Self::Int16,
            "ushort" | "uint16" => Self::UInt16,
            "int" | "int32" => Self::Int32,
            "uint" | "uint32" => Self::UInt32,
            "float" | "float32" => Self::Float32,
            "double" | "float64" => Self::Float64,
            other => return Err(Error::Ply(format!("unknown property type '{other}'"))),
        })
    }
}

#[derive(Debug, Clone)]
enum Property {
    Scalar { name: String, ty: ScalarType },
    List { count: ScalarType, item: ScalarType },
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

impl Element {
    fn index_of(&self, wanted: &str) -> Option<usize> {
        self.properties.iter().position(
            |p| matches!(p, Property::Scalar { name, .. } if name == wanted),
        )
    }
}

struct Header {
    encoding: Encoding,
    elements: Vec<Element>,
}

pub fn looks_like_ply(bytes: &[u8]) -> bool {
    bytes.starts_with(b"ply\n") || bytes.starts_with(b"ply\r\n")
}

pub fn parse(bytes: &[u8]) -> Result<PointCloud> {
    if !looks_like_ply(bytes) {
        return Err(Error::Ply("missing 'ply' magic".to_string()));
    }

    let marker = bytes
        .windows(END_HEADER.len())
        .position(|w| w == END_HEADER)
        .ok_or_else(|| Error::Ply("missing end_header".to_string()))?;
    let body_start = bytes[marker..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|offset| marker + offset + 1)
        .unwrap_or(bytes.len());

    let header_text = std::str::from_utf8(&bytes[..marker])
        .map_err(|_| Error::Ply("header is not UTF-8".to_string()))?;
    let header = parse_header(header_text)?;

    let mut body = match header.encoding {
        Encoding::Ascii => {
            let text = std::str::from_utf8(&bytes[body_start..])
                .map_err(|_| Error::Ply("ascii body is not UTF-8".to_string()))?;
            Body::Ascii(text.split_ascii_whitespace())
        }
        Encoding::BinaryLittleEndian | Encoding::BinaryBigEndian => Body::Binary {
            cursor: Cursor::new(&bytes[body_start..]),
            big_endian: header.encoding == Encoding::BinaryBigEndian,
        },
    };

    for element in &header.elements {
        if element.name == "vertex" {
            return read_vertices(element, &mut body);
        }
        for _ in 0..element.count {
            skip_row(element, &mut body)?;
        }
    }

    Err(Error::Ply("no vertex element".to_string()))
}

fn parse_header(text: &str) -> Result<Header> {
    let mut encoding = None;
    let mut elements: Vec<Element> = Vec::new();

    for line in text.lines().skip(1) {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("format") => {
                encoding = Some(match words.next() {
                    Some("ascii") => Encoding::Ascii,
                    Some("binary_little_endian") => Encoding::BinaryLittleEndian,
                    Some("binary_big_endian") => Encoding::BinaryBigEndian,
                    other => {
                        return Err(Error::Ply(format!("unsupported format {other:?}")));
                    }
                });
            }
            Some("element") => {
                let name = words.next().unwrap_or_default().to_string();
                let count = words
                    .next()
                    .and_then(|c| c.parse().ok())
                    .ok_or_else(|| Error::Ply(format!("bad count for element '{name}'")))?;
                elements.push(Element {
                    name,
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| Error::Ply("property before any element".to_string()))?;
                let property = match words.next() {
                    Some("list") => Property::List {
                        count: ScalarType::parse(words.next().unwrap_or_default())?,
                        item: ScalarType::parse(words.next().unwrap_or_default())?,
                    },
                    Some(ty) => Property::Scalar {
                        ty: ScalarType::parse(ty)?,
                        name: words.next().unwrap_or_default().to_string(),
                    },
                    None => return Err(Error::Ply("empty property line".to_string())),
                };
                element.properties.push(property);
            }
            _ => {}
        }
    }

    Ok(Header {
        encoding: encoding.ok_or_else(|| Error::Ply("missing format line".to_string()))?,
        elements,
    })
}

enum Body<'a> {
    Ascii(std::str::SplitAsciiWhitespace<'a>),
    Binary {
        cursor: Cursor<&'a [u8]>,
        big_endian: bool,
    },
}

impl Body<'_> {
    fn read(&mut self, ty: ScalarType) -> Result<f64> {
        match self {
            Body::Ascii(tokens) => tokens
                .next()
                .and_then(|t| t.parse::<f64>().ok())
                .ok_or_else(|| Error::Ply("truncated ascii body".to_string())),
            Body::Binary { cursor, big_endian } => {
                let value = if *big_endian {
                    read_scalar::<BigEndian>(cursor, ty)
                } else {
                    read_scalar::<LittleEndian>(cursor, ty)
                };
                value.map_err(|_| Error::Ply("truncated binary body".to_string()))
            }
        }
    }
}

fn read_scalar<B: ByteOrder>(cursor: &mut Cursor<&[u8]>, ty: ScalarType) -> io::Result<f64> {
    Ok(match ty {
        ScalarType::Int8 => f64::from(cursor.read_i8()?),
        ScalarType::UInt8 => f64::from(cursor.read_u8()?),
        ScalarType::Int16 => f64::from(cursor.read_i16::<B>()?),
        ScalarType::UInt16 => f64::from(cursor.read_u16::<B>()?),
        ScalarType::Int32 => f64::from(cursor.read_i32::<B>()?),
        ScalarType::UInt32 => f64::from(cursor.read_u32::<B>()?),
        ScalarType::Float32 => f64::from(cursor.read_f32::<B>()?),
        ScalarType::Float64 => cursor.read_f64::<B>()?,
    })
}

fn skip_row(element: &Element, body: &mut Body<'_>) -> Result<()> {
    for property in &element.properties {
        match property {
            Property::Scalar { ty, .. } => {
                body.read(*ty)?;
            }
            Property::List { count, item } => {
                let n = body.read(*count)? as usize;
                for _ in 0..n {
                    body.read(*item)?;
                }
            }
        }
    }
    Ok(())
}

fn read_vertices(element: &Element, body: &mut Body<'_>) -> Result<PointCloud> {
    let (Some(x), Some(y), Some(z)) = (
        element.index_of("x"),
        element.index_of("y"),
        element.index_of("z"),
    ) else {
        return Err(Error::Ply("vertex element lacks x/y/z".to_string()));
    };
    let rgb = match (
        element.index_of("red"),
        element.index_of("green"),
        element.index_of("blue"),
    ) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };

    // The header count is untrusted; storage grows only with rows actually read.
    let mut points = Vec::new();
    let mut colors = rgb.map(|_| Vec::new());
    let mut row = vec![0.0f64; element.properties.len()];

    for _ in 0..element.count {
        for (slot, property) in row.iter_mut().zip(&element.properties) {
            *slot = match property {
                Property::Scalar { ty, .. } => body.read(*ty)?,
                Property::List { count, item } => {
                    let n = body.read(*count)? as usize;
                    for _ in 0..n {
                        body.read(*item)?;
                    }
                    0.0
                }
            };
        }

        points.push([row[x] as f32, row[y] as f32, row[z] as f32]);
        if let (Some([r, g, b]), Some(colors)) = (rgb, colors.as_mut()) {
            colors.push([row[r] as u8, row[g] as u8, row[b] as u8]);
        }
    }

    Ok(PointCloud { points, colors })
}
