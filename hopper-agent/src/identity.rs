//! The node's one piece of durable state: its kiosk id.
//!
//! Generated on first boot, written to a single file with mode 0600, and
//! never regenerated. Everything else on this node is rebuilt by polling
//! the coordinator.

use std::{fs, io, path::Path, str::FromStr};

use anyhow::Context;
use hopper_common::{ids::KioskId, rng::Crng};
use tracing::info;

/// Read the kiosk id from `path`, or generate and persist a fresh one if the
/// file does not exist yet.
///
/// A present-but-unreadable or corrupt file is an error, not a trigger for
/// regeneration: silently minting a new identity would strand any in-flight
/// jobs leased to the old one.
pub fn load_or_generate(
    path: &Path,
    rng: &mut impl Crng,
) -> anyhow::Result<KioskId> {
    match fs::read_to_string(path) {
        Ok(raw) => KioskId::from_str(raw.trim()).with_context(|| {
            format!("Corrupt kiosk id file: {}", path.display())
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let id = KioskId::generate(rng);
            write_id_file(path, id).with_context(|| {
                format!("Could not write kiosk id file: {}", path.display())
            })?;
            info!(kiosk_id = %id, "generated fresh kiosk identity");
            Ok(id)
        }
        Err(err) => Err(err).with_context(|| {
            format!("Could not read kiosk id file: {}", path.display())
        }),
    }
}

fn write_id_file(path: &Path, id: KioskId) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    // create_new: if two agents race on first boot, exactly one identity
    // wins and the loser errors instead of clobbering.
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    io::Write::write_all(&mut file, format!("{id}\n").as_bytes())?;
    file.sync_all()
}
