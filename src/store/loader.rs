//! Parses the `.snmprec`-style data file format from §6:
//! `<oid>|<type-code>[:<variation-tag>[,key=val]*]|<value>`.
//!
//! A malformed or unknown-tagged line is a load error, not a skipped line
//! (§6: "Unknown tags are a load error"; SPEC_FULL §C1: "a bad data file
//! fails fast").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::model::{AsnValue, ErrorStatus, Oid, TypeCode};
use crate::producers::{
    CounterGroup, CounterProducer, DelayDistribution, DelayProducer, ErrorProducer, ErrorTrigger,
    StaticProducer, ValueProducer, WriteCacheProducer,
};
use crate::store::Record;
use crate::{Error, Result};

/// Carries the mutable state a loader needs across lines in one file: a
/// shared wall-clock epoch for counters, and named counter groups so
/// related OIDs (e.g. ifIn/ifOut) can share a `t0` (§4.2).
pub struct LoadContext {
    epoch: Instant,
    counter_groups: HashMap<String, Arc<CounterGroup>>,
}

impl LoadContext {
    pub fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            counter_groups: HashMap::new(),
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    fn counter_group(&mut self, key: &str, bits: u8, rate: f64, acceleration: f64) -> Arc<CounterGroup> {
        Arc::clone(
            self.counter_groups
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CounterGroup::new(self.epoch, bits, rate, acceleration))),
        )
    }
}

impl Default for LoadContext {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

/// Parses an entire data file's contents into `Record`s, in file order.
/// Blank lines and lines starting with `#` are skipped; everything else
/// must parse or the whole load fails.
pub fn parse_records(contents: &str, load_ctx: &mut LoadContext) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = parse_line(line, load_ctx)
            .map_err(|e| {
                tracing::error!(line = lineno + 1, error = %e, "failed to load record line");
                e
            })?;
        records.push(record);
    }
    Ok(records)
}

fn parse_line(line: &str, load_ctx: &mut LoadContext) -> Result<Record> {
    let mut parts = line.splitn(3, '|');
    let oid_str = parts.next().ok_or_else(|| Error::store("missing oid field"))?;
    let type_field = parts.next().ok_or_else(|| Error::store("missing type field"))?;
    let value_str = parts.next().ok_or_else(|| Error::store("missing value field"))?;

    let oid = Oid::from_str(oid_str)?;
    let (code, tag_spec) = match type_field.split_once(':') {
        Some((code, tag)) => (code, Some(tag)),
        None => (type_field, None),
    };
    let asn_type = TypeCode::from_code(code)?;
    let base_value = asn_type.parse_value(value_str)?;

    let record = Record::new(oid, asn_type, base_value.clone());
    let record = match tag_spec {
        None => record,
        Some(spec) => {
            let (tag, params) = parse_tag_spec(spec)?;
            let producer = build_producer(&tag, &params, asn_type, base_value, load_ctx)?;
            record.with_producer(producer)
        }
    };
    Ok(record)
}

fn parse_tag_spec(spec: &str) -> Result<(String, HashMap<String, String>)> {
    let mut fields = spec.split(',');
    let tag = fields
        .next()
        .ok_or_else(|| Error::store("empty variation tag"))?
        .to_string();
    let mut params = HashMap::new();
    for field in fields {
        let (k, v) = field
            .split_once('=')
            .ok_or_else(|| Error::store(format!("malformed variation parameter: {field}")))?;
        params.insert(k.to_string(), v.to_string());
    }
    Ok((tag, params))
}

fn build_producer(
    tag: &str,
    params: &HashMap<String, String>,
    asn_type: TypeCode,
    base_value: AsnValue,
    load_ctx: &mut LoadContext,
) -> Result<Arc<dyn ValueProducer>> {
    let get = |key: &str| params.get(key).map(|s| s.as_str());
    let parse_num = |key: &str, default: f64| -> Result<f64> {
        match get(key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| Error::store(format!("invalid numeric parameter {key}={v}"))),
        }
    };

    match tag {
        "writecache" => Ok(Arc::new(WriteCacheProducer::new(asn_type, base_value))),
        "delay" => {
            let ms = parse_num("ms", 0.0)? as u64;
            let dev = parse_num("dev", 0.0)? as u64;
            let dist = match get("dist") {
                Some("normal") => DelayDistribution::Normal,
                _ => DelayDistribution::Uniform,
            };
            Ok(Arc::new(DelayProducer::new(base_value, ms, dev, dist)))
        }
        "error" => {
            let status = parse_error_status(get("status").unwrap_or("genErr"))?;
            let trigger = match get("trigger") {
                Some("write") => ErrorTrigger::Write,
                Some("any") => ErrorTrigger::Any,
                _ => ErrorTrigger::Read,
            };
            Ok(Arc::new(ErrorProducer::new(status, trigger)))
        }
        "counter" => {
            let bits = parse_num("bits", 32.0)? as u8;
            let rate = parse_num("rate", 1.0)?;
            let accel = parse_num("accel", 1.0)?;
            let phase = parse_num("seed", 0.0)? as u64;
            let group_key = get("group").unwrap_or("__default__");
            let group = load_ctx.counter_group(group_key, bits, rate, accel);
            Ok(Arc::new(CounterProducer::new(group, phase)))
        }
        "dynamic" => build_dynamic_producer(params, load_ctx.epoch),
        other => Err(Error::store(format!("unknown variation tag: {other}"))),
    }
}

fn build_dynamic_producer(
    params: &HashMap<String, String>,
    epoch: Instant,
) -> Result<Arc<dyn ValueProducer>> {
    use crate::producers::{DynamicCurve, DynamicOutputType, DynamicProducer};

    let parse_num = |key: &str, default: f64| -> Result<f64> {
        match params.get(key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| Error::store(format!("invalid numeric parameter {key}={v}"))),
        }
    };
    let curve = match params.get("curve").map(|s| s.as_str()) {
        Some("sine") | None => DynamicCurve::Sine {
            amplitude: parse_num("amplitude", 10.0)?,
            period_s: parse_num("period", 60.0)?,
            offset: parse_num("offset", 50.0)?,
        },
        Some("hourly") => DynamicCurve::HourlyUtilization {
            min: parse_num("min", 0.0)?,
            max: parse_num("max", 100.0)?,
            peak_hour: parse_num("peak", 14.0)? as u32,
        },
        Some(other) => return Err(Error::store(format!("unknown dynamic curve: {other}"))),
    };
    Ok(Arc::new(DynamicProducer::new(
        curve,
        epoch,
        DynamicOutputType::Gauge32,
    )))
}

pub(crate) fn parse_error_status(name: &str) -> Result<ErrorStatus> {
    Ok(match name {
        "tooBig" => ErrorStatus::TooBig,
        "noSuchName" => ErrorStatus::NoSuchName,
        "badValue" => ErrorStatus::BadValue,
        "readOnly" => ErrorStatus::ReadOnly,
        "genErr" => ErrorStatus::GenErr,
        "noAccess" => ErrorStatus::NoAccess,
        "wrongType" => ErrorStatus::WrongType,
        "wrongLength" => ErrorStatus::WrongLength,
        "wrongValue" => ErrorStatus::WrongValue,
        "noCreation" => ErrorStatus::NoCreation,
        "inconsistentValue" => ErrorStatus::InconsistentValue,
        "resourceUnavailable" => ErrorStatus::ResourceUnavailable,
        "commitFailed" => ErrorStatus::CommitFailed,
        "undoFailed" => ErrorStatus::UndoFailed,
        "authorizationError" => ErrorStatus::AuthorizationError,
        "notWritable" => ErrorStatus::NotWritable,
        "inconsistentName" => ErrorStatus::InconsistentName,
        other => return Err(Error::store(format!("unknown error status: {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_static_line() {
        let mut ctx = LoadContext::default();
        let records =
            parse_records("1.3.6.1.2.1.1.1.0|4|Mock SNMP Agent\n", &mut ctx).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].producer.is_none());
    }

    #[test]
    fn parses_counter_with_shared_group() {
        let mut ctx = LoadContext::default();
        let contents = "\
1.3.6.1.2.1.2.2.1.10.1|65:counter,bits=32,rate=1,accel=1000,seed=0,group=if1|0
1.3.6.1.2.1.2.2.1.16.1|65:counter,bits=32,rate=2,accel=1000,seed=0,group=if1|0
";
        let records = parse_records(contents, &mut ctx).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].producer.is_some());
        assert!(records[1].producer.is_some());
    }

    #[test]
    fn unknown_tag_is_a_load_error() {
        let mut ctx = LoadContext::default();
        let err = parse_records("1.3.6.1.1|4:bogus|x\n", &mut ctx).unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn malformed_line_is_a_load_error() {
        let mut ctx = LoadContext::default();
        let err = parse_records("not-a-valid-line\n", &mut ctx).unwrap_err();
        assert!(matches!(err, Error::Store(_) | Error::Parse(_)));
    }
}
