//! Envelope builder and parser.

use {
    crate::{document::DocumentType, scheme, BUSINESS_SECTOR},
    chrono::{DateTime, Duration, DurationRound, Utc},
    domain::{DomainError, GlnNumber, Result},
    serde_json::{json, Map, Value},
    std::collections::BTreeMap,
    uuid::Uuid,
};

const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One transaction inside the envelope. Kept as an ordered string map so a
/// build/parse round trip is byte-stable.
pub type MktActivityRecord = BTreeMap<String, Value>;

/// A parsed or built market document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub document_type: DocumentType,
    pub mrid: String,
    pub process_type: String,
    pub sender: GlnNumber,
    pub receiver: GlnNumber,
    pub created_at: DateTime<Utc>,
    pub series: Vec<MktActivityRecord>,
}

impl Envelope {
    pub fn create(
        document_type: DocumentType,
        process_code: &str,
        sender: GlnNumber,
    ) -> EnvelopeBuilder {
        EnvelopeBuilder {
            document_type,
            process_type: process_code.to_owned(),
            sender,
            receiver: None,
            created_at: None,
            series: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        let body = json!({
            "mRID": self.mrid,
            "type": { "value": self.document_type.rsm() },
            "process": { "processType": { "value": self.process_type } },
            "businessSector": { "type": { "value": BUSINESS_SECTOR } },
            "sender_MarketParticipant.mRID": {
                "codingScheme": scheme::GLN,
                "value": self.sender.as_str(),
            },
            "receiver_MarketParticipant.mRID": {
                "codingScheme": scheme::GLN,
                "value": self.receiver.as_str(),
            },
            "createdDateTime": self.created_at.format(CREATED_FORMAT).to_string(),
            "MktActivityRecord": self.series,
        });
        let mut root = Map::new();
        root.insert(self.document_type.wire_name(), body);
        Value::Object(root)
    }

    pub fn to_payload(&self) -> String {
        self.to_json().to_string()
    }

    pub fn parse(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|err| DomainError::Validation(format!("envelope is not JSON: {err}")))?;
        let object = value
            .as_object()
            .filter(|object| object.len() == 1)
            .ok_or_else(|| {
                DomainError::Validation(
                    "envelope must hold exactly one market document".to_owned(),
                )
            })?;
        let (name, body) = object.iter().next().ok_or_else(|| {
            DomainError::Validation("envelope must hold a market document".to_owned())
        })?;
        let document_type = DocumentType::from_wire_name(name)?;
        let body = body.as_object().ok_or_else(|| {
            DomainError::Validation(format!("{name} body must be an object"))
        })?;

        let created_raw = required_str(body, "createdDateTime")?;
        let created_at = chrono::NaiveDateTime::parse_from_str(created_raw, CREATED_FORMAT)
            .map_err(|err| {
                DomainError::Validation(format!("bad createdDateTime {created_raw:?}: {err}"))
            })?
            .and_utc();

        let series = match body.get("MktActivityRecord") {
            None => Vec::new(),
            Some(Value::Array(records)) => records
                .iter()
                .map(|record| {
                    record
                        .as_object()
                        .map(|map| {
                            map.iter()
                                .map(|(k, v)| (k.clone(), v.clone()))
                                .collect::<MktActivityRecord>()
                        })
                        .ok_or_else(|| {
                            DomainError::Validation(
                                "MktActivityRecord entries must be objects".to_owned(),
                            )
                        })
                })
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(DomainError::Validation(
                    "MktActivityRecord must be an array".to_owned(),
                ));
            }
        };

        Ok(Self {
            document_type,
            mrid: required_str(body, "mRID")?.to_owned(),
            process_type: nested_value(body, "process", &["processType", "value"])?,
            sender: participant(body, "sender_MarketParticipant.mRID")?,
            receiver: participant(body, "receiver_MarketParticipant.mRID")?,
            created_at,
            series,
        })
    }
}

fn required_str<'a>(body: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Validation(format!("envelope header misses {key}")))
}

fn nested_value(body: &Map<String, Value>, key: &str, path: &[&str]) -> Result<String> {
    let mut value = body
        .get(key)
        .ok_or_else(|| DomainError::Validation(format!("envelope header misses {key}")))?;
    for segment in path {
        value = value.get(segment).ok_or_else(|| {
            DomainError::Validation(format!("envelope header misses {key}.{segment}"))
        })?;
    }
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| DomainError::Validation(format!("{key} must be a string")))
}

fn participant(body: &Map<String, Value>, key: &str) -> Result<GlnNumber> {
    let gln = nested_value(body, key, &["value"])?;
    GlnNumber::from_trusted(&gln)
}

pub struct EnvelopeBuilder {
    document_type: DocumentType,
    process_type: String,
    sender: GlnNumber,
    receiver: Option<GlnNumber>,
    created_at: Option<DateTime<Utc>>,
    series: Vec<MktActivityRecord>,
}

impl EnvelopeBuilder {
    pub fn receiver(mut self, receiver: GlnNumber) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn add_series(mut self, record: MktActivityRecord) -> Self {
        self.series.push(record);
        self
    }

    pub fn build(self) -> Result<Envelope> {
        let receiver = self.receiver.ok_or_else(|| {
            DomainError::Validation("envelope requires a receiver".to_owned())
        })?;
        // The wire format carries whole seconds only.
        let created_at = self
            .created_at
            .unwrap_or_else(Utc::now)
            .duration_trunc(Duration::seconds(1))
            .map_err(|err| DomainError::Internal(err.to_string()))?;
        Ok(Envelope {
            document_type: self.document_type,
            mrid: Uuid::new_v4().to_string(),
            process_type: self.process_type,
            sender: self.sender,
            receiver,
            created_at,
            series: self.series,
        })
    }
}

/// Convenience for building activity records out of string pairs.
pub fn record<const N: usize>(fields: [(&str, Value); N]) -> MktActivityRecord {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone, strum::IntoEnumIterator};

    fn gln(value: &str) -> GlnNumber {
        GlnNumber::from_trusted(value).unwrap()
    }

    fn sample(document_type: DocumentType) -> Envelope {
        Envelope::create(document_type, "E03", gln("5790000432752"))
            .receiver(gln("5790000432769"))
            .created_at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
            .add_series(record([
                ("mRID", json!("tx-1")),
                ("marketEvaluationPoint.mRID", json!("571313180400013562")),
                ("start_DateAndOrTime.dateTime", json!("2026-03-01T00:00:00Z")),
            ]))
            .build()
            .unwrap()
    }

    #[test]
    fn round_trips_every_document() {
        for document_type in DocumentType::iter() {
            let envelope = sample(document_type);
            let parsed = Envelope::parse(&envelope.to_payload()).unwrap();
            assert_eq!(parsed, envelope);
        }
    }

    #[test]
    fn created_date_time_is_utc_with_trailing_z() {
        let payload = sample(DocumentType::RequestChangeOfSupplier).to_payload();
        assert!(payload.contains(r#""createdDateTime":"2026-03-01T12:00:00Z""#));
    }

    #[test]
    fn unknown_optional_fields_are_ignored() {
        let mut value = sample(DocumentType::RequestChangeOfSupplier).to_json();
        value["RequestChangeOfSupplier_MarketDocument"]["docStatus"] = json!({"value": "A02"});
        let parsed = Envelope::parse(&value.to_string()).unwrap();
        assert_eq!(parsed.process_type, "E03");
    }

    #[test]
    fn missing_header_fields_fail() {
        let mut value = sample(DocumentType::RequestChangeOfSupplier).to_json();
        value["RequestChangeOfSupplier_MarketDocument"]
            .as_object_mut()
            .unwrap()
            .remove("createdDateTime");
        assert!(Envelope::parse(&value.to_string()).is_err());
    }

    #[test]
    fn two_documents_in_one_envelope_fail() {
        assert!(Envelope::parse(r#"{"A_MarketDocument":{},"B_MarketDocument":{}}"#).is_err());
    }
}
