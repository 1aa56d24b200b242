//! Best-effort fan-out with per-recipient results.

use super::{ContextId, Endpoint, Envelope};
use crate::error::{log_protocol_error, ProtocolError};
use crate::telemetry;

/// Outcome of delivering one envelope to one recipient
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipient: ContextId,
    pub result: Result<(), ProtocolError>,
}

impl Delivery {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Deliver a copy of `envelope` to every recipient
///
/// A failed recipient never prevents delivery to the others; the caller gets
/// one `Delivery` per recipient, in iteration order.
pub fn fan_out<'a, I>(recipients: I, envelope: &Envelope) -> Vec<Delivery>
where
    I: IntoIterator<Item = &'a Endpoint>,
{
    recipients
        .into_iter()
        .map(|endpoint| Delivery {
            recipient: endpoint.id.clone(),
            result: endpoint.deliver(envelope.clone()),
        })
        .collect()
}

/// Log and record failed deliveries; returns the failed recipients
pub fn report_failures(deliveries: &[Delivery], context: &str) -> Vec<ContextId> {
    deliveries
        .iter()
        .filter_map(|delivery| match &delivery.result {
            Ok(()) => None,
            Err(err) => {
                log_protocol_error(err, context);
                telemetry::hub().record_delivery_failure(&delivery.recipient, err);
                Some(delivery.recipient.clone())
            }
        })
        .collect()
}
