//! Pipeline stages for image-to-ICD-10 analysis.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own with canned model responses.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ extract ──▶ clean ──▶ resolve ──▶ parse
//! (checks)  (base64)   (vision)   (text)    (text LLM)  (records)
//! ```
//!
//! 1. [`input`]   — filename, size and decode checks; nothing downstream runs
//!    on a rejected upload
//! 2. [`encode`]  — base64-wrap the original bytes for the multimodal request
//! 3. [`extract`] — one vision call: image → findings text
//! 4. [`clean`]   — strip model quirks from the findings before reuse
//! 5. [`resolve`] — one text call: findings → `CODE:/DIAGNOSIS:/REASON:` text
//! 6. [`parse`]   — two-state line parser: text → ordered code records
//!
//! [`ocr`] is an alternative backend for step 3 that shells out to a local
//! OCR model instead of calling a hosted vision model.

pub mod clean;
pub mod encode;
pub mod extract;
pub mod input;
pub mod ocr;
pub mod parse;
pub mod resolve;

use crate::error::{Icd10Error, Stage};
use crate::services::{Completion, ServiceError};
use std::future::Future;
use tokio::time::{timeout, Duration};
use tracing::warn;

/// Run one model call under the configured timeout.
///
/// Exactly one attempt is made. A timeout or backend error becomes a fatal
/// error tagged with `stage`; there is no partial-result salvage.
pub(crate) async fn call_service<F>(
    stage: Stage,
    timeout_secs: u64,
    call: F,
) -> Result<Completion, Icd10Error>
where
    F: Future<Output = Result<Completion, ServiceError>>,
{
    match timeout(Duration::from_secs(timeout_secs), call).await {
        Ok(Ok(completion)) => Ok(completion),
        Ok(Err(e)) => {
            warn!("{} call failed: {}", stage, e);
            Err(Icd10Error::ServiceFailed {
                stage,
                detail: e.to_string(),
            })
        }
        Err(_) => {
            warn!("{} call timed out after {}s", stage, timeout_secs);
            Err(Icd10Error::ServiceTimeout {
                stage,
                secs: timeout_secs,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn service_error_is_tagged_with_stage() {
        let err = call_service(Stage::Resolution, 5, async {
            Err(ServiceError("quota exceeded".into()))
        })
        .await
        .unwrap_err();
        match err {
            Icd10Error::ServiceFailed { stage, detail } => {
                assert_eq!(stage, Stage::Resolution);
                assert_eq!(detail, "quota exceeded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let err = call_service(Stage::Extraction, 1, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Completion::text("too late"))
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Icd10Error::ServiceTimeout {
                stage: Stage::Extraction,
                secs: 1
            }
        ));
    }
}
