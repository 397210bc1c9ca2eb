//! Anchor event decoder — scans a transaction's log messages for
//! `Program data:` entries attributed to the indexed program and
//! deserializes the ones whose 8-byte prefix matches a known event
//! discriminator.

use std::sync::Arc;

use base64::Engine;
use indexmap::IndexMap;
use tracing::warn;

use uho_idl::program::EventDef;
use uho_idl::ProgramSpec;
use uho_rpc::ParsedTransaction;

use crate::borsh_read::read_value;
use crate::error::DecodeError;
use crate::record::DecodedEvent;
use crate::value::NormalizedValue;

const PROGRAM_DATA_PREFIX: &str = "Program data: ";
const PROGRAM_LINE_PREFIX: &str = "Program ";

/// One transaction log line, classified for attribution tracking.
enum LogLine<'a> {
    /// `Program <id> invoke [n]` — the program enters the call stack.
    Invoke(&'a str),
    /// `Program <id> success` / `Program <id> failed: ...` — it leaves.
    Finish(&'a str),
    /// `Program data: <base64>` — emitted by the currently executing program.
    Data(&'a str),
    Other,
}

fn classify(line: &str) -> LogLine<'_> {
    if let Some(encoded) = line.strip_prefix(PROGRAM_DATA_PREFIX) {
        return LogLine::Data(encoded);
    }
    if let Some(rest) = line.strip_prefix(PROGRAM_LINE_PREFIX) {
        // `Program log:` / `Program return:` lines share the prefix but
        // carry a `<word>:` token where the program id would be.
        let mut parts = rest.splitn(2, ' ');
        let id = parts.next().unwrap_or("");
        let tail = parts.next().unwrap_or("");
        if tail.starts_with("invoke [") {
            return LogLine::Invoke(id);
        }
        if tail == "success" || tail.starts_with("failed") {
            return LogLine::Finish(id);
        }
    }
    LogLine::Other
}

/// Decodes program events out of transaction logs.
pub struct EventDecoder {
    program: Arc<ProgramSpec>,
}

impl EventDecoder {
    pub fn new(program: Arc<ProgramSpec>) -> Self {
        Self { program }
    }

    /// Decode every matching event in `tx`, in log order.
    ///
    /// Solana interleaves log lines from every program in the CPI call
    /// tree, so a call-depth stack is tracked over the
    /// `invoke`/`success`/`failed` brackets and a `Program data:` line is
    /// attributed to whichever program is executing at that point. Only
    /// lines attributed to the configured program are matched — Anchor
    /// discriminators carry no program-id salt, so an identically-named
    /// event in a CPI'd program would otherwise collide.
    ///
    /// Attributed lines that match no discriminator are ignored silently; a
    /// matching line with a malformed body skips that single event with a
    /// warning. `ix_index` is a monotonically increasing counter over
    /// matched lines so positions stay stable even when a body fails to
    /// decode.
    pub fn decode_transaction(&self, tx: &ParsedTransaction) -> Vec<DecodedEvent> {
        let mut out = Vec::new();
        let mut counter = 0u32;
        let mut stack: Vec<&str> = Vec::new();

        for line in tx.log_messages() {
            let encoded = match classify(line) {
                LogLine::Invoke(id) => {
                    stack.push(id);
                    continue;
                }
                LogLine::Finish(id) => {
                    // Truncated logs can drop brackets; only pop a match.
                    if stack.last() == Some(&id) {
                        stack.pop();
                    }
                    continue;
                }
                LogLine::Data(encoded) => encoded,
                LogLine::Other => continue,
            };
            if stack.last().copied() != Some(self.program.program_id.as_str()) {
                continue;
            }
            let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
                continue;
            };
            let Some(event) = self.program.event_by_discriminator(&bytes) else {
                continue;
            };

            let ix_index = counter;
            counter += 1;

            match decode_event_body(event, &bytes[8..], &self.program) {
                Ok(data) => out.push(DecodedEvent {
                    event_name: event.name.clone(),
                    program_id: self.program.program_id.clone(),
                    slot: tx.slot,
                    block_time: tx.block_time,
                    tx_signature: tx.signature().to_string(),
                    ix_index,
                    inner_ix_index: None,
                    data,
                }),
                Err(e) => {
                    warn!(
                        event = %event.name,
                        signature = %tx.signature(),
                        error = %e,
                        "malformed event body, skipping"
                    );
                }
            }
        }
        out
    }
}

fn decode_event_body(
    event: &EventDef,
    body: &[u8],
    program: &ProgramSpec,
) -> Result<IndexMap<String, NormalizedValue>, DecodeError> {
    let mut cursor = body;
    let mut data = IndexMap::with_capacity(event.fields.len());
    for field in &event.fields {
        let value = read_value(&mut cursor, &field.ty, program)?;
        data.insert(field.column.clone(), value);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use serde_json::json;
    use uho_idl::event_discriminator;

    const PROGRAM: &str = "Amm111111111111111111111111111111111111111";
    const OTHER_PROGRAM: &str = "Othr11111111111111111111111111111111111111";

    fn swap_spec() -> Arc<ProgramSpec> {
        Arc::new(
            ProgramSpec::from_value(
                &json!({
                    "name": "myAmm",
                    "metadata": {"address": PROGRAM},
                    "events": [{
                        "name": "SwapEvent",
                        "fields": [
                            {"name": "amm", "type": "publicKey"},
                            {"name": "inputAmount", "type": "u64"},
                            {"name": "outputAmount", "type": "u64"},
                            {"name": "fee", "type": "u64"},
                            {"name": "timestamp", "type": "i64"}
                        ]
                    }]
                }),
                None,
            )
            .unwrap(),
        )
    }

    fn tx_with_logs(logs: Vec<String>) -> ParsedTransaction {
        serde_json::from_value(json!({
            "slot": 250_000_000u64,
            "blockTime": 1_720_000_000i64,
            "transaction": {
                "signatures": ["SwapSig111"],
                "message": {"accountKeys": [], "instructions": []}
            },
            "meta": {"err": null, "logMessages": logs, "innerInstructions": []}
        }))
        .unwrap()
    }

    fn swap_payload(amm: [u8; 32]) -> String {
        let mut payload = event_discriminator("SwapEvent").to_vec();
        payload.extend_from_slice(&amm);
        payload.extend_from_slice(&1_000_000u64.to_le_bytes());
        payload.extend_from_slice(&500_000u64.to_le_bytes());
        payload.extend_from_slice(&1_000u64.to_le_bytes());
        payload.extend_from_slice(&1_720_000_000i64.to_le_bytes());
        base64::engine::general_purpose::STANDARD.encode(payload)
    }

    #[test]
    fn decodes_swap_event_from_log() {
        let amm_bytes = [3u8; 32];
        let tx = tx_with_logs(vec![
            format!("Program {PROGRAM} invoke [1]"),
            "Program log: Instruction: Swap".into(),
            format!("Program data: {}", swap_payload(amm_bytes)),
            format!("Program {PROGRAM} success"),
        ]);
        let events = EventDecoder::new(swap_spec()).decode_transaction(&tx);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_name, "SwapEvent");
        assert_eq!(event.slot, 250_000_000);
        assert_eq!(event.tx_signature, "SwapSig111");
        assert_eq!(event.ix_index, 0);
        assert_eq!(event.inner_ix_index, None);
        assert_eq!(
            event.data.get("amm"),
            Some(&NormalizedValue::Pubkey(
                bs58::encode(amm_bytes).into_string()
            ))
        );
        assert_eq!(
            event.data.get("input_amount"),
            Some(&NormalizedValue::ULong(1_000_000))
        );
        assert_eq!(
            event.data.get("timestamp"),
            Some(&NormalizedValue::Long(1_720_000_000))
        );
    }

    #[test]
    fn unmatched_and_invalid_lines_are_ignored() {
        let tx = tx_with_logs(vec![
            format!("Program {PROGRAM} invoke [1]"),
            "Program log: Instruction: Swap".into(),
            "Program data: !!!not-base64!!!".into(),
            // Valid base64, unknown discriminator
            format!(
                "Program data: {}",
                base64::engine::general_purpose::STANDARD.encode([0u8; 24])
            ),
            format!("Program {PROGRAM} success"),
        ]);
        let events = EventDecoder::new(swap_spec()).decode_transaction(&tx);
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_body_skips_only_that_event() {
        let mut truncated = event_discriminator("SwapEvent").to_vec();
        truncated.extend_from_slice(&[1u8; 10]); // far too short for the field list
        let tx = tx_with_logs(vec![
            format!("Program {PROGRAM} invoke [1]"),
            format!(
                "Program data: {}",
                base64::engine::general_purpose::STANDARD.encode(truncated)
            ),
            format!("Program data: {}", swap_payload([9u8; 32])),
            format!("Program {PROGRAM} success"),
        ]);
        let events = EventDecoder::new(swap_spec()).decode_transaction(&tx);
        assert_eq!(events.len(), 1);
        // The skipped event still consumed position 0
        assert_eq!(events[0].ix_index, 1);
    }

    #[test]
    fn multiple_events_get_increasing_indices() {
        let tx = tx_with_logs(vec![
            format!("Program {PROGRAM} invoke [1]"),
            format!("Program data: {}", swap_payload([1u8; 32])),
            format!("Program data: {}", swap_payload([2u8; 32])),
            format!("Program {PROGRAM} success"),
        ]);
        let events = EventDecoder::new(swap_spec()).decode_transaction(&tx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].ix_index, 0);
        assert_eq!(events[1].ix_index, 1);
    }

    #[test]
    fn cpi_events_from_other_programs_are_not_misattributed() {
        // The CPI'd program emits a payload whose discriminator collides
        // with this program's SwapEvent; only the outer emission counts.
        let tx = tx_with_logs(vec![
            format!("Program {PROGRAM} invoke [1]"),
            format!("Program {OTHER_PROGRAM} invoke [2]"),
            format!("Program data: {}", swap_payload([7u8; 32])),
            format!("Program {OTHER_PROGRAM} success"),
            format!("Program data: {}", swap_payload([8u8; 32])),
            format!("Program {PROGRAM} success"),
        ]);
        let events = EventDecoder::new(swap_spec()).decode_transaction(&tx);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].data.get("amm"),
            Some(&NormalizedValue::Pubkey(
                bs58::encode([8u8; 32]).into_string()
            ))
        );
    }

    #[test]
    fn unattributed_data_lines_are_skipped() {
        // Same payload emitted while another program is executing, and once
        // with no bracket context at all.
        let tx = tx_with_logs(vec![
            format!("Program {OTHER_PROGRAM} invoke [1]"),
            format!("Program data: {}", swap_payload([1u8; 32])),
            format!("Program {OTHER_PROGRAM} success"),
            format!("Program data: {}", swap_payload([2u8; 32])),
        ]);
        let events = EventDecoder::new(swap_spec()).decode_transaction(&tx);
        assert!(events.is_empty());
    }
}
