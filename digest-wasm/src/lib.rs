//! Framework-neutral WASM <-> JavaScript bridge so the browser client runs the
//! same compressor as the server.

use digest_core::{DigestConfig, DigestError};
use serde::Deserialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Deserialize, Default)]
struct JsDigestConfig {
    #[serde(default)]
    max_observations_per_type: Option<usize>,
    #[serde(default)]
    default_dose_unit: Option<String>,
}

impl From<JsDigestConfig> for DigestConfig {
    fn from(cfg: JsDigestConfig) -> Self {
        let mut base = DigestConfig::default();
        if let Some(max) = cfg.max_observations_per_type {
            base.max_observations_per_type = max;
        }
        if let Some(unit) = cfg.default_dose_unit {
            base.default_dose_unit = unit;
        }
        base
    }
}

/// Compress a bundle object into the digest string.
///
/// `null` or `undefined` bundles yield the invalid-bundle sentinel.
#[wasm_bindgen(js_name = compressBundle)]
pub fn compress_bundle(
    input_bundle: JsValue,
    config: Option<JsValue>,
) -> Result<String, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let cfg = read_config(config)?;
    let bundle_value = read_bundle(input_bundle)?;
    Ok(digest_fhir::compress_bundle_value(&bundle_value, &cfg))
}

/// Structured digest (clauses, counts, skipped entries); throws for invalid bundles.
#[wasm_bindgen(js_name = digestBundle)]
pub fn digest_bundle(
    input_bundle: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let cfg = read_config(config)?;
    let bundle_value = read_bundle(input_bundle)?;
    let digest = digest_fhir::digest_bundle_value(&bundle_value, &cfg)
        .map_err(|err| JsValue::from_str(&format_digest_error(err)))?;

    to_value(&digest)
        .map_err(|err| JsValue::from_str(&format!("Could not serialize digest: {err}")))
}

fn read_bundle(input_bundle: JsValue) -> Result<serde_json::Value, JsValue> {
    if input_bundle.is_null() || input_bundle.is_undefined() {
        return Ok(serde_json::Value::Null);
    }
    from_value::<serde_json::Value>(input_bundle)
        .map_err(|err| JsValue::from_str(&format!("Could not read bundle JSON: {err}")))
}

fn read_config(config: Option<JsValue>) -> Result<DigestConfig, JsValue> {
    let cfg = match config {
        Some(js_cfg) if !js_cfg.is_null() && !js_cfg.is_undefined() => {
            let cfg: JsDigestConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Could not read config: {err}")))?;
            DigestConfig::from(cfg)
        }
        _ => DigestConfig::default(),
    };
    cfg.validate()
        .map_err(|err| JsValue::from_str(&format_digest_error(err)))?;
    Ok(cfg)
}

fn format_digest_error(err: DigestError) -> String {
    format!("Digest error: {err}")
}
