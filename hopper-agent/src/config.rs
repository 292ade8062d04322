//! CLI args for the dispenser-node agent.

use argh::FromArgs;

/// Run the hopper dispenser-node agent.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// base URL of the coordinator, e.g. "https://hopper.example"
    #[argh(option)]
    pub coordinator_url: String,

    /// path of the kiosk id file (created on first boot)
    #[argh(option, default = "String::from(\"kiosk-id\")")]
    pub kiosk_id_file: String,

    /// delay between polls when no job is available, in milliseconds
    #[argh(option, default = "2000")]
    pub idle_poll_ms: u64,

    /// upper bound on a single dispense actuation, in seconds
    #[argh(option, default = "30")]
    pub dispense_timeout_secs: u64,

    /// use the mock hopper driver instead of real hardware
    #[argh(switch)]
    pub mock_hardware: bool,
}
