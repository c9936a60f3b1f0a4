#![allow(clippy::missing_errors_doc)]

use std::{error::Error, fmt};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use tidepool_core::HeightField;

const SNAPSHOT_DOMAIN: &str = "terrain";
const SNAPSHOT_VERSION: &str = "v1";

/// Identifier prefix emitted before the encoded terrain payload.
pub(crate) const SNAPSHOT_HEADER: &str = "terrain:v1";
/// Delimiter used to separate the prefix, grid dimensions and payload.
const FIELD_DELIMITER: char = ':';

/// Encodes the height field into a single-line string suitable for clipboard transfer.
pub(crate) fn encode(height_field: &HeightField) -> Result<String, TerrainTransferError> {
    let payload = SerializableTerrain {
        levels: height_field.levels().to_vec(),
    };
    let json = serde_json::to_vec(&payload).map_err(TerrainTransferError::InvalidPayload)?;
    let encoded = STANDARD_NO_PAD.encode(json);
    Ok(format!(
        "{SNAPSHOT_HEADER}:{}x{}:{encoded}",
        height_field.width(),
        height_field.height()
    ))
}

/// Decodes a height field from the provided string representation.
pub(crate) fn decode(value: &str) -> Result<HeightField, TerrainTransferError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TerrainTransferError::EmptyPayload);
    }

    let mut parts = trimmed.split(FIELD_DELIMITER);
    let domain = parts.next().ok_or(TerrainTransferError::MissingPrefix)?;
    let version = parts.next().ok_or(TerrainTransferError::MissingVersion)?;
    let dimensions = parts
        .next()
        .ok_or(TerrainTransferError::MissingDimensions)?;
    let payload = parts.next().ok_or(TerrainTransferError::MissingPayload)?;

    if domain != SNAPSHOT_DOMAIN {
        return Err(TerrainTransferError::InvalidPrefix(domain.to_owned()));
    }
    if version != SNAPSHOT_VERSION {
        return Err(TerrainTransferError::UnsupportedVersion(version.to_owned()));
    }

    let (width, height) = parse_dimensions(dimensions)?;
    let bytes = STANDARD_NO_PAD
        .decode(payload.as_bytes())
        .map_err(TerrainTransferError::InvalidEncoding)?;
    let decoded: SerializableTerrain =
        serde_json::from_slice(&bytes).map_err(TerrainTransferError::InvalidPayload)?;

    let found = decoded.levels.len();
    HeightField::from_levels(width, height, decoded.levels).map_err(|_| {
        TerrainTransferError::LevelCountMismatch {
            expected: width as usize * height as usize,
            found,
        }
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SerializableTerrain {
    levels: Vec<u32>,
}

/// Errors that can occur while decoding terrain transfer strings.
#[derive(Debug)]
pub(crate) enum TerrainTransferError {
    /// The provided string was empty or contained only whitespace.
    EmptyPayload,
    /// The prefix segment was missing from the encoded terrain.
    MissingPrefix,
    /// The encoded terrain did not contain a version segment.
    MissingVersion,
    /// The encoded terrain did not include grid dimensions.
    MissingDimensions,
    /// The encoded terrain did not include the payload segment.
    MissingPayload,
    /// The encoded terrain used an unexpected prefix segment.
    InvalidPrefix(String),
    /// The encoded terrain used an unsupported version identifier.
    UnsupportedVersion(String),
    /// The grid dimensions could not be parsed from the encoded terrain.
    InvalidDimensions(String),
    /// The base64 payload could not be decoded.
    InvalidEncoding(base64::DecodeError),
    /// The payload could not be serialised or deserialised.
    InvalidPayload(serde_json::Error),
    /// The payload did not hold one level per column.
    LevelCountMismatch {
        /// Columns described by the dimensions segment.
        expected: usize,
        /// Levels carried by the payload.
        found: usize,
    },
}

impl fmt::Display for TerrainTransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPayload => write!(f, "terrain payload was empty"),
            Self::MissingPrefix => write!(f, "terrain string is missing the prefix"),
            Self::MissingVersion => write!(f, "terrain string is missing the version"),
            Self::MissingDimensions => write!(f, "terrain string is missing the grid dimensions"),
            Self::MissingPayload => write!(f, "terrain string is missing the payload"),
            Self::InvalidPrefix(prefix) => write!(f, "terrain prefix '{prefix}' is not supported"),
            Self::UnsupportedVersion(version) => {
                write!(f, "terrain version '{version}' is not supported")
            }
            Self::InvalidDimensions(dimensions) => {
                write!(f, "could not parse grid dimensions '{dimensions}'")
            }
            Self::InvalidEncoding(error) => {
                write!(f, "could not decode terrain payload: {error}")
            }
            Self::InvalidPayload(error) => {
                write!(f, "could not parse terrain payload: {error}")
            }
            Self::LevelCountMismatch { expected, found } => {
                write!(f, "terrain payload holds {found} levels, expected {expected}")
            }
        }
    }
}

impl Error for TerrainTransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidEncoding(error) => Some(error),
            Self::InvalidPayload(error) => Some(error),
            _ => None,
        }
    }
}

fn parse_dimensions(dimensions: &str) -> Result<(u32, u32), TerrainTransferError> {
    let (width, height) = dimensions
        .split_once(['x', 'X'])
        .ok_or_else(|| TerrainTransferError::InvalidDimensions(dimensions.to_owned()))?;

    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|_| TerrainTransferError::InvalidDimensions(dimensions.to_owned()))?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|_| TerrainTransferError::InvalidDimensions(dimensions.to_owned()))?;

    if width == 0 || height == 0 {
        return Err(TerrainTransferError::InvalidDimensions(
            dimensions.to_owned(),
        ));
    }

    Ok((width, height))
}
