//! Error producer: signals a specific error status on read/write as
//! configured (§4.2). Producers never throw to signal SNMP errors — they
//! report through `ReadOutcome`/`ctx.derived` instead (§9).

use async_trait::async_trait;

use crate::model::{AsnValue, ErrorStatus, ReadOutcome, RequestContext, SetOutcome};
use crate::producers::{ProducerKind, ValueProducer};
use crate::Result;

/// Which operations trigger the configured error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTrigger {
    Read,
    Write,
    Any,
}

#[derive(Debug, Clone)]
pub struct ErrorProducer {
    status: ErrorStatus,
    trigger: ErrorTrigger,
}

impl ErrorProducer {
    pub fn new(status: ErrorStatus, trigger: ErrorTrigger) -> Self {
        Self { status, trigger }
    }
}

#[async_trait]
impl ValueProducer for ErrorProducer {
    async fn read(&self, _ctx: &mut RequestContext) -> Result<ReadOutcome> {
        match self.trigger {
            ErrorTrigger::Read | ErrorTrigger::Any => Ok(ReadOutcome::ErrorOverride(self.status)),
            ErrorTrigger::Write => Ok(ReadOutcome::Value(AsnValue::NoSuchInstance)),
        }
    }

    fn is_writable(&self) -> bool {
        matches!(self.trigger, ErrorTrigger::Write | ErrorTrigger::Any)
    }

    async fn write(&self, _ctx: &mut RequestContext, _value: AsnValue) -> Result<SetOutcome> {
        match self.trigger {
            ErrorTrigger::Write | ErrorTrigger::Any => Ok(self
                .status
                .to_set_outcome()
                .unwrap_or(SetOutcome::ResourceUnavailable)),
            ErrorTrigger::Read => Ok(SetOutcome::NotWritable),
        }
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::Error
    }
}

trait ErrorStatusExt {
    fn to_set_outcome(&self) -> Option<SetOutcome>;
}

impl ErrorStatusExt for ErrorStatus {
    fn to_set_outcome(&self) -> Option<SetOutcome> {
        match self {
            ErrorStatus::WrongType | ErrorStatus::WrongValue | ErrorStatus::WrongLength => {
                Some(SetOutcome::WrongType)
            }
            ErrorStatus::NotWritable | ErrorStatus::ReadOnly => Some(SetOutcome::NotWritable),
            ErrorStatus::NoAccess | ErrorStatus::AuthorizationError => Some(SetOutcome::NoAccess),
            ErrorStatus::ResourceUnavailable | ErrorStatus::CommitFailed => {
                Some(SetOutcome::ResourceUnavailable)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn read_trigger_overrides_error() {
        let p = ErrorProducer::new(ErrorStatus::GenErr, ErrorTrigger::Read);
        let mut ctx = test_ctx();
        match p.read(&mut ctx).await.unwrap() {
            ReadOutcome::ErrorOverride(ErrorStatus::GenErr) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_only_trigger_is_silent_on_read() {
        let p = ErrorProducer::new(ErrorStatus::ResourceUnavailable, ErrorTrigger::Write);
        let mut ctx = test_ctx();
        match p.read(&mut ctx).await.unwrap() {
            ReadOutcome::Value(AsnValue::NoSuchInstance) => {}
            other => panic!("unexpected: {other:?}"),
        }
        let status = p.write(&mut ctx, AsnValue::Integer32(1)).await.unwrap();
        assert_eq!(status, SetOutcome::ResourceUnavailable);
    }
}
