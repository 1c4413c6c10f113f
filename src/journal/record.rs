//! journal/record — логическая запись журнала и сериализация body.
//!
//! Body кадра — JSON-конверт (serde_json):
//!   {"v": <format_version u32>, "entity": "<entity id>", "payload": <P> | null}
//!
//! Правила версий:
//! - v == CURRENT_FORMAT_VERSION — payload декодируется в P;
//! - 1 <= v < CURRENT           — устаревшая запись: конверт валиден, payload не разбирается
//!                                (None), компактация такую запись выбрасывает;
//! - v > CURRENT               — запись более нового писателя: конверт валиден, payload не
//!                                разбирается (None); компактация переносит кадр как есть;
//! - v == 0                     — UnsupportedVersion (для читателя это "повреждённый body").

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::FrameError;
use crate::consts::CURRENT_FORMAT_VERSION;

/// Contract between the journal and the opaque test-result payload.
///
/// The journal never looks inside a payload except through these two
/// accessors, which the retention policy and history delivery need.
pub trait JournalPayload: Serialize + DeserializeOwned {
    /// Logical time of the run, unix seconds. `None` exempts the record
    /// from age-based eviction.
    fn timestamp(&self) -> Option<u64>;

    /// Whether the payload describes a completed run worth handing back to
    /// a live entity (false for "not run" markers).
    fn is_meaningful(&self) -> bool;
}

/// Receiver of surviving history during `load`.
pub trait HistorySink<P> {
    /// Deliver one payload to the live entity `entity_id`.
    /// Returns false when no such entity exists (the payload is dropped).
    fn add_history(&mut self, entity_id: &str, payload: P) -> bool;
}

/// Sink that matches nothing; used by maintenance commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl<P> HistorySink<P> for NoHistory {
    fn add_history(&mut self, _entity_id: &str, _payload: P) -> bool {
        false
    }
}

/// Only keys already present are treated as live entities.
impl<P> HistorySink<P> for HashMap<String, Vec<P>> {
    fn add_history(&mut self, entity_id: &str, payload: P) -> bool {
        match self.get_mut(entity_id) {
            Some(hist) => {
                hist.push(payload);
                true
            }
            None => false,
        }
    }
}

/// Decoded body of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalRecord<P> {
    pub format_version: u32,
    pub entity_id: String,
    pub payload: Option<P>,
}

impl<P> LogicalRecord<P> {
    /// Current-format record carrying a payload.
    pub fn new<S: Into<String>>(entity_id: S, payload: P) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            entity_id: entity_id.into(),
            payload: Some(payload),
        }
    }

    /// Current-format record without payload (never retained or delivered).
    pub fn inert<S: Into<String>>(entity_id: S) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            entity_id: entity_id.into(),
            payload: None,
        }
    }

    #[inline]
    pub fn is_obsolete(&self) -> bool {
        self.format_version < CURRENT_FORMAT_VERSION
    }

    /// Written by a newer format than this build understands.
    #[inline]
    pub fn is_newer_format(&self) -> bool {
        self.format_version > CURRENT_FORMAT_VERSION
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a, P> {
    v: u32,
    entity: &'a str,
    payload: Option<&'a P>,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    v: u32,
    entity: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

/// Сериализовать запись в body кадра.
pub fn encode_body<P: Serialize>(rec: &LogicalRecord<P>) -> Result<Vec<u8>, FrameError> {
    let env = EnvelopeOut {
        v: rec.format_version,
        entity: &rec.entity_id,
        payload: rec.payload.as_ref(),
    };
    serde_json::to_vec(&env).map_err(|e| FrameError::Serialize(e.to_string()))
}

/// Разобрать body кадра в запись. Одна ветка на поддерживаемую версию.
pub fn decode_body<P: DeserializeOwned>(body: &[u8]) -> Result<LogicalRecord<P>, FrameError> {
    let env: EnvelopeIn =
        serde_json::from_slice(body).map_err(|e| FrameError::PayloadCorrupt(e.to_string()))?;

    match env.v {
        CURRENT_FORMAT_VERSION => {
            let payload = match env.payload {
                None | Some(serde_json::Value::Null) => None,
                Some(v) => Some(
                    serde_json::from_value::<P>(v)
                        .map_err(|e| FrameError::PayloadCorrupt(e.to_string()))?,
                ),
            };
            Ok(LogicalRecord {
                format_version: env.v,
                entity_id: env.entity,
                payload,
            })
        }
        // устаревший или более новый формат: payload не трогаем
        v if v >= 1 => Ok(LogicalRecord {
            format_version: v,
            entity_id: env.entity,
            payload: None,
        }),
        other => Err(FrameError::UnsupportedVersion(other)),
    }
}
