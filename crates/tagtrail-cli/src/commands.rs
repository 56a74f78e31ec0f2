use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use tagtrail_shared::firmware::{FirmwarePatcher, FirmwareTemplates};
use tagtrail_shared::keys::{KeyPair, KeyPairExport};
use tagtrail_shared::{decrypt_report, DecryptedFix, MacAddress};

pub fn keygen(out: &mut impl Write, json: bool) -> Result<()> {
    let pair = KeyPair::generate().context("key generation failed")?;
    print_keys(out, &pair.to_export(), json)
}

pub fn inspect(out: &mut impl Write, private: &str, json: bool) -> Result<()> {
    let pair = KeyPair::from_private_base64(private).context("invalid private key")?;
    if !pair.is_wire_safe() {
        warn!("advertisement hash contains '/' or '+', the report network may reject it");
    }
    print_keys(out, &pair.to_export(), json)
}

fn print_keys(out: &mut impl Write, export: &KeyPairExport, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, export)?;
        writeln!(out)?;
    } else {
        writeln!(out, "Private key:        {}", export.private_key)?;
        writeln!(out, "Advertisement key:  {}", export.advertisement_key)?;
        writeln!(out, "Advertisement hash: {}", export.advertisement_hash)?;
        writeln!(out, "MAC address:        {}", export.mac_address)?;
    }
    Ok(())
}

pub fn patch(
    out: &mut impl Write,
    private: &str,
    input: &Path,
    output: Option<PathBuf>,
    templates: Option<&Path>,
) -> Result<()> {
    let pair = KeyPair::from_private_base64(private).context("invalid private key")?;
    let templates = match templates {
        Some(path) => load_templates(path)?,
        None => FirmwareTemplates::default(),
    };

    let mut image = std::fs::read(input)
        .with_context(|| format!("failed to read firmware {}", input.display()))?;
    let report = FirmwarePatcher::new(templates)
        .patch_image(&mut image, pair.advertisement_key())
        .with_context(|| format!("failed to patch {}", input.display()))?;
    debug!(?report, "firmware regions patched");

    let output = output.unwrap_or_else(|| default_output_path(input, &pair.mac_address()));
    std::fs::write(&output, &image)
        .with_context(|| format!("failed to write {}", output.display()))?;

    writeln!(out, "MAC address: {}", pair.mac_address())?;
    writeln!(out, "Firmware:    {}", output.display())?;
    Ok(())
}

fn load_templates(path: &Path) -> Result<FirmwareTemplates> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read templates {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid templates {}", path.display()))
}

/// `dir/firmware.bin` -> `dir/firmware-C0_11_22_33_44_55.bin`
pub fn default_output_path(input: &Path, mac: &MacAddress) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "firmware".to_string());
    input.with_file_name(format!("{stem}-{}.bin", mac.to_file_tag()))
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum DecryptOutcome<'a> {
    Ok { payload: &'a str, fix: DecryptedFix },
    Error { payload: &'a str, error: String },
}

pub fn decrypt(
    out: &mut impl Write,
    private: &str,
    payloads: &[String],
    json: bool,
) -> Result<()> {
    let pair = KeyPair::from_private_base64(private).context("invalid private key")?;

    let outcomes: Vec<DecryptOutcome<'_>> = payloads
        .iter()
        .map(String::as_str)
        .map(|payload| match decrypt_report(payload, pair.secret_key()) {
            Ok(fix) => DecryptOutcome::Ok { payload, fix },
            Err(e) => {
                warn!(error = %e, "report could not be decrypted");
                DecryptOutcome::Error {
                    payload,
                    error: e.to_string(),
                }
            }
        })
        .collect();

    if json {
        serde_json::to_writer_pretty(&mut *out, &outcomes)?;
        writeln!(out)?;
    } else {
        for outcome in &outcomes {
            match outcome {
                DecryptOutcome::Ok { fix, .. } => writeln!(
                    out,
                    "{}  {:.7}, {:.7}  accuracy {} m  confidence {}",
                    fix.time.to_rfc3339(),
                    fix.latitude,
                    fix.longitude,
                    fix.accuracy,
                    fix.confidence
                )?,
                DecryptOutcome::Error { payload, error } => {
                    writeln!(out, "{}  error: {error}", short(payload))?
                }
            }
        }
    }

    if outcomes.iter().all(|o| matches!(o, DecryptOutcome::Error { .. })) {
        bail!("none of the {} reports could be decrypted", outcomes.len());
    }
    Ok(())
}

fn short(payload: &str) -> &str {
    payload.get(..12).unwrap_or(payload)
}
