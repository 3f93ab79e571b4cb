//! NVS persistence for the weight limit. One raw byte survives power
//! cycles; everything else (calibration factor, tare offset) is rebuilt at
//! boot by design.

use crate::types::{DEFAULT_LIMIT_RAW, LIMIT_UNIT_G, UNSET_LIMIT_MAX_RAW};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::{error, info, warn};
use std::sync::Arc;

const NVS_NAMESPACE: &str = "hopper";
const LIMIT_KEY: &str = "limit";

/// Decide the effective raw byte from whatever the store returned.
/// Absent or <= 5 means uninitialized flash; the default is written back.
fn sanitize_loaded(raw: Option<u8>) -> (u8, bool) {
    match raw {
        Some(v) if v > UNSET_LIMIT_MAX_RAW => (v, false),
        _ => (DEFAULT_LIMIT_RAW, true),
    }
}

/// The entry buffer allows three digits but the record is one byte; values
/// past 255 are clamped rather than truncated through the byte write.
fn clamp_requested(requested: u16) -> u8 {
    requested.min(u8::MAX as u16) as u8
}

pub fn effective_limit_g(raw: u8) -> f32 {
    raw as f32 * LIMIT_UNIT_G
}

pub struct LimitStore {
    nvs: Option<Arc<Mutex<CriticalSectionRawMutex, EspNvs<NvsDefault>>>>,
    mock_byte: Arc<Mutex<CriticalSectionRawMutex, Option<u8>>>,
    mock_mode: bool,
}

impl LimitStore {
    pub fn new(partition: Option<EspDefaultNvsPartition>) -> Self {
        let nvs = partition.and_then(|p| match EspNvs::new(p, NVS_NAMESPACE, true) {
            Ok(nvs) => {
                info!("NVS limit store initialized (namespace '{}')", NVS_NAMESPACE);
                Some(Arc::new(Mutex::new(nvs)))
            }
            Err(e) => {
                warn!("NVS init failed: {:?} - using in-memory store", e);
                None
            }
        });
        let mock_mode = nvs.is_none();

        Self {
            nvs,
            mock_byte: Arc::new(Mutex::new(None)),
            mock_mode,
        }
    }

    /// In-memory store, used when NVS is unavailable and by tests.
    pub fn mock() -> Self {
        Self {
            nvs: None,
            mock_byte: Arc::new(Mutex::new(None)),
            mock_mode: true,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.mock_mode
    }

    /// Boot-time load: read the byte, reset uninitialized values to the
    /// default, and verify any write by reading it back.
    pub async fn load_limit_raw(&self) -> u8 {
        let stored = self.read_byte().await;
        let (effective, needs_writeback) = sanitize_loaded(stored);

        if needs_writeback {
            info!(
                "Stored limit {:?} treated as unset - writing default {}",
                stored, effective
            );
            if let Err(e) = self.write_verified(effective).await {
                error!("Failed to persist default limit: {}", e);
            }
        } else {
            info!("Loaded limit byte {} ({}g)", effective, effective_limit_g(effective));
        }

        effective
    }

    /// Persist an operator-entered limit. Returns the byte actually stored
    /// after read-back, which is what the effective limit is computed from.
    pub async fn save_limit_raw(&self, requested: u16) -> Result<u8, Box<dyn std::error::Error>> {
        let raw = clamp_requested(requested);
        if raw as u16 != requested {
            warn!("Requested limit {} clamped to {}", requested, raw);
        }

        self.write_verified(raw).await?;
        info!("Limit byte {} saved ({}g)", raw, effective_limit_g(raw));
        Ok(raw)
    }

    async fn read_byte(&self) -> Option<u8> {
        if let Some(ref nvs_arc) = self.nvs {
            let nvs = nvs_arc.lock().await;
            match nvs.get_u8(LIMIT_KEY) {
                Ok(v) => v,
                Err(e) => {
                    warn!("NVS read failed: {:?} - treating as unset", e);
                    None
                }
            }
        } else {
            *self.mock_byte.lock().await
        }
    }

    async fn write_verified(&self, raw: u8) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref nvs_arc) = self.nvs {
            let mut nvs = nvs_arc.lock().await;
            nvs.set_u8(LIMIT_KEY, raw)?;
            // A torn write must not pass silently; the read-back is the commit check.
            match nvs.get_u8(LIMIT_KEY)? {
                Some(v) if v == raw => Ok(()),
                other => Err(format!("limit write verify failed: wrote {}, read {:?}", raw, other).into()),
            }
        } else {
            *self.mock_byte.lock().await = Some(raw);
            Ok(())
        }
    }
}
