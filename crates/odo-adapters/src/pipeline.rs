//! Encode, write and verify a credential with the RFID station.
//!
//! # Sequences
//!
//! ```text
//! iclass: pending ─▶ hf iclass encode --bin <binary> --ki 0 ─▶ blocks 6,7,8 ok? ─▶ success | failure
//! prox:   pending ─▶ lf hid clone -r <preamble> ─▶ lf hid reader ─▶ raw == preamble? ─▶ success | failure
//! ```
//!
//! Exactly one `pending` and one terminal status are published per
//! credential. A driver failure (timeout, end of output) still publishes
//! `failure` before the error is returned to the supervisor.

use crate::supervisor::Outbox;
use odo_core::{Credential, Result, Target, WriteStatus, constants::ICLASS_DATA_BLOCKS};
use odo_hardware::CommandDriver;
use odo_network::BusClient;
use odo_protocol::Envelope;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, error, info};

/// Reader command used to read a prox card back.
pub const PROX_READ_COMMAND: &str = "lf hid reader";

static PROX_RAW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[=\]\sraw:\s*(.+)").expect("invalid prox raw pattern"));

pub fn iclass_command(credential: &Credential) -> String {
    format!("hf iclass encode --bin {} --ki 0", credential.to_binary())
}

pub fn prox_clone_command(credential: &Credential) -> String {
    format!("lf hid clone -r {}", credential.to_preamble_hex())
}

/// Confirmation line printed for a successfully written iCLASS block.
fn block_marker(block: u8) -> String {
    format!("write block {block}/0x{block:02x} ( ok )")
}

/// Data blocks without a write confirmation in `output`.
///
/// ```
/// use odo_adapters::pipeline::missing_iclass_blocks;
///
/// let output = "[+] Write block 6/0x06 ( ok )\n[+] Write block 8/0x08 ( ok )\n";
/// assert_eq!(missing_iclass_blocks(output), vec![7]);
/// ```
pub fn missing_iclass_blocks(output: &str) -> Vec<u8> {
    let output = output.to_lowercase();
    ICLASS_DATA_BLOCKS
        .iter()
        .copied()
        .filter(|block| !output.contains(&block_marker(*block)))
        .collect()
}

/// Raw frame reported by `lf hid reader`, without leading zeros.
pub fn prox_readback(output: &str) -> Option<String> {
    PROX_RAW.captures(output).map(|captures| {
        captures[1]
            .trim()
            .trim_start_matches('0')
            .to_lowercase()
    })
}

/// Runs the write sequences on a command driver.
#[derive(Debug, Clone)]
pub struct WritePipeline {
    written_topic: String,
}

impl WritePipeline {
    pub fn new(written_topic: impl Into<String>) -> Self {
        Self {
            written_topic: written_topic.into(),
        }
    }

    /// Write `credential` for `target`, publishing `pending` then the
    /// terminal status on the written topic.
    ///
    /// # Errors
    /// Returns the driver error after publishing `failure`, or a bus error
    /// if a status could not be published.
    pub async fn write<D: CommandDriver, B: BusClient>(
        &self,
        driver: &mut D,
        credential: &Credential,
        target: Target,
        outbox: &mut Outbox<'_, B>,
    ) -> Result<WriteStatus> {
        self.report(outbox, credential, WriteStatus::Pending).await?;

        let outcome = match target {
            Target::Iclass => Self::encode_iclass(driver, credential).await,
            Target::Prox => Self::encode_prox(driver, credential).await,
        };

        let status = match &outcome {
            Ok(status) => *status,
            Err(e) => {
                error!(%credential, error = %e, "Write aborted");
                WriteStatus::Failure
            }
        };

        let reported = self.report(outbox, credential, status).await;
        let status = outcome?;
        reported?;
        Ok(status)
    }

    async fn report<B: BusClient>(
        &self,
        outbox: &mut Outbox<'_, B>,
        credential: &Credential,
        status: WriteStatus,
    ) -> Result<()> {
        outbox
            .publish(
                &self.written_topic,
                &Envelope::written(credential.clone(), status),
            )
            .await
    }

    /// Encode an iCLASS card and check that every data block was written.
    pub async fn encode_iclass<D: CommandDriver>(
        driver: &mut D,
        credential: &Credential,
    ) -> Result<WriteStatus> {
        info!(%credential, binary = %credential.to_binary(), "Encoding iCLASS");

        let command = iclass_command(credential);
        debug!(command = %command, "->");
        let output = driver.execute(&command).await?;
        debug!(output = %output, "<-");

        let missing = missing_iclass_blocks(&output);
        for block in &missing {
            error!(block, "Error writing block");
        }

        if missing.is_empty() {
            info!(%credential, "Credential written successfully");
        }
        Ok(WriteStatus::from_verified(missing.is_empty()))
    }

    /// Clone a prox card and read it back.
    pub async fn encode_prox<D: CommandDriver>(
        driver: &mut D,
        credential: &Credential,
    ) -> Result<WriteStatus> {
        let preamble = credential.to_preamble_hex();
        info!(%credential, binary = %credential.to_binary(), %preamble, "Cloning prox");

        let command = prox_clone_command(credential);
        debug!(command = %command, "->");
        let output = driver.execute(&command).await?;
        debug!(output = %output, "<-");

        debug!(command = PROX_READ_COMMAND, "->");
        let output = driver.execute(PROX_READ_COMMAND).await?;
        debug!(output = %output, "<-");

        let verified = match prox_readback(&output) {
            Some(actual) if actual == preamble => {
                info!(%credential, "Credential written successfully");
                true
            }
            Some(actual) => {
                error!(expected = %preamble, %actual, "Target credential not cloned");
                false
            }
            None => {
                error!(expected = %preamble, "No raw frame in reader output");
                false
            }
        };

        Ok(WriteStatus::from_verified(verified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odo_core::Error;
    use odo_hardware::mock::{MockCommandDriver, MockReply};
    use rstest::rstest;

    const ALL_BLOCKS: &str = "[+] Write block 6/0x06 ( ok )\n\
                              [+] Write block 7/0x07 ( ok )\n\
                              [+] Write block 8/0x08 ( ok )\n";

    fn credential() -> Credential {
        Credential::new(26, "2ec0c86", 1042).unwrap()
    }

    #[test]
    fn test_commands() {
        assert_eq!(
            iclass_command(&credential()),
            "hf iclass encode --bin 10111011000000110010000110 --ki 0"
        );
        assert_eq!(prox_clone_command(&credential()), "lf hid clone -r 2006ec0c86");
    }

    #[rstest]
    #[case(ALL_BLOCKS, vec![])]
    #[case(
        concat!(
            "[+] WRITE BLOCK 6/0X06 ( OK )\n",
            "[+] write block 7/0x07 ( ok )\n",
            "[+] Write block 8/0x08 ( ok )",
        ),
        vec![]
    )]
    #[case("[+] Write block 6/0x06 ( ok )\n[-] Write block 7/0x07 ( fail )\n", vec![7, 8])]
    #[case("", vec![6, 7, 8])]
    fn test_missing_blocks(#[case] output: &str, #[case] missing: Vec<u8>) {
        assert_eq!(missing_iclass_blocks(output), missing);
    }

    #[rstest]
    #[case("[=] raw: 0000002006ec0c86\n", Some("2006ec0c86"))]
    #[case("[+] HID H10301\n[=] raw:   2006EC0C86  \n", Some("2006ec0c86"))]
    #[case("[=] raw: 2006ec0c87", Some("2006ec0c87"))]
    #[case("[!] No known/supported 125 kHz tag found\n", None)]
    #[case("prefix [=] raw: 2006ec0c86", None)]
    fn test_prox_readback(#[case] output: &str, #[case] expected: Option<&str>) {
        assert_eq!(prox_readback(output).as_deref(), expected);
    }

    #[tokio::test]
    async fn test_iclass_all_blocks() {
        let (mut driver, handle) = MockCommandDriver::new();
        driver.open().await.unwrap();
        handle.push_reply(MockReply::output(ALL_BLOCKS)).await;

        let status = WritePipeline::encode_iclass(&mut driver, &credential()).await.unwrap();
        assert_eq!(status, WriteStatus::Success);
        assert_eq!(handle.commands().await, vec![iclass_command(&credential())]);
    }

    #[tokio::test]
    async fn test_iclass_missing_block() {
        let (mut driver, handle) = MockCommandDriver::new();
        driver.open().await.unwrap();
        handle
            .push_reply(MockReply::output(
                "[+] Write block 6/0x06 ( ok )\n[+] Write block 8/0x08 ( ok )\n",
            ))
            .await;

        let status = WritePipeline::encode_iclass(&mut driver, &credential()).await.unwrap();
        assert_eq!(status, WriteStatus::Failure);
    }

    #[rstest]
    #[case("[=] raw: 000000002006ec0c86\n", WriteStatus::Success)]
    #[case("[=] raw: 000000002006ec0c00\n", WriteStatus::Failure)]
    #[case("[!] no tag\n", WriteStatus::Failure)]
    #[tokio::test]
    async fn test_prox_verification(#[case] readback: &str, #[case] expected: WriteStatus) {
        let (mut driver, handle) = MockCommandDriver::new();
        driver.open().await.unwrap();
        handle.push_reply(MockReply::output("[+] cloned\n")).await;
        handle.push_reply(MockReply::output(readback)).await;

        let status = WritePipeline::encode_prox(&mut driver, &credential()).await.unwrap();
        assert_eq!(status, expected);
        assert_eq!(
            handle.commands().await,
            vec!["lf hid clone -r 2006ec0c86".to_string(), PROX_READ_COMMAND.to_string()]
        );
    }

    #[tokio::test]
    async fn test_driver_timeout_propagates() {
        let (mut driver, handle) = MockCommandDriver::new();
        driver.open().await.unwrap();
        handle.push_reply(MockReply::Timeout).await;

        let error = WritePipeline::encode_iclass(&mut driver, &credential())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::HardwareTimeout { .. }));
        assert!(error.is_fatal());
    }
}
