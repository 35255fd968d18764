//! Result records shared by GET, WALK and TRAP.

use serde_json::{json, Value};

use crate::pipeline::ingest::now_nanos;
use crate::pipeline::Pipeline;
use crate::snmp::value::VarBind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpOperation {
    Get,
    Walk,
    Trap,
}

impl SnmpOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            SnmpOperation::Get => "get",
            SnmpOperation::Walk => "walk",
            SnmpOperation::Trap => "trap",
        }
    }
}

/// `{operation, source, results: [{oid, type, value}], timestamp}`.
pub fn result_record(operation: SnmpOperation, source: &str, varbinds: &[VarBind], timestamp: i64) -> Value {
    let results: Vec<Value> = varbinds
        .iter()
        .map(|vb| {
            json!({
                "oid": vb.oid,
                "type": vb.value.type_name(),
                "value": vb.value.to_string(),
            })
        })
        .collect();

    json!({
        "operation": operation.as_str(),
        "source": source,
        "results": results,
        "timestamp": timestamp,
    })
}

/// Build the record for one exchange and hand it to the pipeline.
///
/// Pipeline failures are logged here; they never fail the SNMP operation.
pub async fn process_results(
    pipeline: &Pipeline,
    operation: SnmpOperation,
    source: &str,
    varbinds: &[VarBind],
    persist: bool,
) {
    let record = result_record(operation, source, varbinds, now_nanos());
    if let Err(e) = pipeline.ingest_snmp(operation.as_str(), source, &record, persist).await {
        tracing::error!(
            operation = operation.as_str(),
            source = %source,
            error = %e,
            durable = e.is_durable(),
            "Failed to deliver SNMP results"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::value::SnmpValue;

    #[test]
    fn test_record_shape() {
        let varbinds = vec![
            VarBind::new(".1.3.6.1.2.1.1.5.0", SnmpValue::OctetString(b"edge-01".to_vec())),
            VarBind::new(".1.3.6.1.2.1.1.3.0", SnmpValue::TimeTicks(100)),
        ];
        let record = result_record(SnmpOperation::Walk, "10.0.0.1", &varbinds, 7);

        assert_eq!(
            record,
            json!({
                "operation": "walk",
                "source": "10.0.0.1",
                "results": [
                    {"oid": ".1.3.6.1.2.1.1.5.0", "type": "OctetString", "value": "edge-01"},
                    {"oid": ".1.3.6.1.2.1.1.3.0", "type": "TimeTicks", "value": "100"},
                ],
                "timestamp": 7,
            })
        );
    }

    #[test]
    fn test_empty_results_is_empty_list() {
        let record = result_record(SnmpOperation::Trap, "10.0.0.9:162", &[], 1);
        assert_eq!(record["results"], json!([]));
    }
}
