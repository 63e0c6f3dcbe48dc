use crate::application::engine::FinishAck;
use crate::application::restore::RestoreOutcome;
use crate::domain::events::{OutboundEvent, PurchaseErrorEvent};
use crate::domain::transaction::TransactionId;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Answer to a host query, written alongside the outbound events.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "report", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Report {
    Catalog { product_ids: Vec<String> },
    Restore { outcome: RestoreOutcome },
    Sync { ok: bool },
    Finish { transaction_id: TransactionId, ack: FinishAck },
    Unfinished { transaction_ids: Vec<TransactionId> },
    Entitlements { product_ids: Vec<String> },
    Cleared { count: usize },
    CanPay { enabled: bool },
    /// An operation the engine rejected synchronously.
    Rejected { op: String, error: PurchaseErrorEvent },
}

/// Writes one JSON document per line.
pub struct EventWriter<W: Write> {
    writer: W,
}

impl<W: Write> EventWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_event(&mut self, event: &OutboundEvent) -> Result<()> {
        self.write_line(event)
    }

    pub fn write_events(&mut self, events: Vec<OutboundEvent>) -> Result<()> {
        for event in &events {
            self.write_event(event)?;
        }
        Ok(())
    }

    pub fn write_report(&mut self, report: &Report) -> Result<()> {
        self.write_line(report)
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::ErrorCode;

    fn lines(writer: EventWriter<Vec<u8>>) -> Vec<serde_json::Value> {
        let bytes = writer.into_inner().unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_events_and_reports_are_one_per_line() {
        let mut writer = EventWriter::new(Vec::new());
        writer
            .write_event(&OutboundEvent::PromotedProduct {
                intent_id: "intent-1".into(),
                product_id: "A".into(),
            })
            .unwrap();
        writer
            .write_report(&Report::Finish {
                transaction_id: 3,
                ack: FinishAck::NotFound,
            })
            .unwrap();
        writer.write_report(&Report::Restore { outcome: RestoreOutcome::NeverPurchased }).unwrap();

        let lines = lines(writer);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "iap-promoted-product");
        assert_eq!(lines[0]["payload"]["intentId"], "intent-1");
        assert_eq!(lines[1]["report"], "finish");
        assert_eq!(lines[1]["transactionId"], 3);
        assert_eq!(lines[1]["ack"], "not-found");
        assert_eq!(lines[2]["outcome"]["status"], "never-purchased");
    }

    #[test]
    fn test_rejection_report_carries_error_record() {
        let mut writer = EventWriter::new(Vec::new());
        writer
            .write_report(&Report::Rejected {
                op: "purchase".into(),
                error: PurchaseErrorEvent::new(ErrorCode::DeveloperError, Some("no such product".into())),
            })
            .unwrap();

        let lines = lines(writer);
        assert_eq!(lines[0]["report"], "rejected");
        assert_eq!(lines[0]["error"]["code"], "DEVELOPER_ERROR");
        assert_eq!(lines[0]["error"]["responseCode"], 400);
    }
}
