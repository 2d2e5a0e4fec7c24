//! Message production.
//!
//! A [`Producer`] turns an application value into a queue message: the
//! body is rendered to text, attributes come pre-encoded from
//! [`ProducerOptions`], and the optional trace header is validated before
//! anything reaches the transport.

use crate::attributes::{AttributeValue, WireAttributes};
use crate::convert::convert_to_string;
use crate::error::SqsError;
use crate::logging::{verbose, verbose_error};
use crate::options::ProducerOptions;
use crate::transport::{SendReceipt, SendRequest, Transport, TRACE_HEADER_ATTRIBUTE};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;

/// Sends typed messages through a transport
#[derive(Clone)]
pub struct Producer {
    transport: Arc<dyn Transport>,
}

impl Producer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send a message and wait for the broker's acknowledgement.
    ///
    /// # Errors
    ///
    /// - [`SqsError::EmptyMessageBody`] when the body renders to empty text
    /// - [`SqsError::InvalidAttributeContainer`] when the attached attributes
    ///   were neither a map nor a record
    /// - [`SqsError::InvalidTraceHeader`] for a malformed trace header
    /// - [`SqsError::Transport`] for failures reported by the transport
    pub async fn send<B>(
        &self,
        queue_url: &str,
        body: &B,
        options: &[ProducerOptions],
    ) -> Result<SendReceipt, SqsError>
    where
        B: Serialize + ?Sized,
    {
        let options = ProducerOptions::merge(options);
        let request = prepare_send_request(body, &options)?;
        submit(self.transport.as_ref(), queue_url, request, options.debug).await
    }

    /// Send a message on a background task.
    ///
    /// The message is encoded before this returns; encoding and transport
    /// failures are logged, never returned. The handle only signals that
    /// the attempt has finished.
    pub fn send_async<B>(
        &self,
        queue_url: impl Into<String>,
        body: &B,
        options: &[ProducerOptions],
    ) -> JoinHandle<()>
    where
        B: Serialize + ?Sized,
    {
        let options = ProducerOptions::merge(options);
        let prepared = prepare_send_request(body, &options);
        let transport = Arc::clone(&self.transport);
        let queue_url = queue_url.into();

        tokio::spawn(async move {
            let result = match prepared {
                Ok(request) => submit(transport.as_ref(), &queue_url, request, options.debug)
                    .await
                    .map(|_| ()),
                Err(error) => Err(error),
            };
            if let Err(error) = result {
                verbose_error!(
                    options.debug,
                    queue_url = %queue_url,
                    error = %error,
                    "Background send failed"
                );
            }
        })
    }
}

async fn submit(
    transport: &dyn Transport,
    queue_url: &str,
    request: SendRequest,
    debug: bool,
) -> Result<SendReceipt, SqsError> {
    match transport.send_message(queue_url, request).await {
        Ok(receipt) => {
            verbose!(
                debug,
                queue_url = %queue_url,
                message_id = %receipt.message_id,
                "Message sent"
            );
            Ok(receipt)
        }
        Err(error) => {
            verbose_error!(debug, queue_url = %queue_url, error = %error, "Failed to send message");
            Err(error.into())
        }
    }
}

/// Build the transport request for a body and merged options
pub(crate) fn prepare_send_request<B>(body: &B, options: &ProducerOptions) -> Result<SendRequest, SqsError>
where
    B: Serialize + ?Sized,
{
    let body = convert_to_string(body);
    if body.is_empty() {
        return Err(SqsError::EmptyMessageBody);
    }

    let attributes = options.attributes()?.cloned();

    let system_attributes = match options.trace_header.as_deref() {
        Some(header) => {
            validate_trace_header(header)?;
            Some(WireAttributes::from([(
                TRACE_HEADER_ATTRIBUTE.to_string(),
                AttributeValue::string(header),
            )]))
        }
        None => None,
    };

    Ok(SendRequest {
        body,
        delay_seconds: options.delay_seconds(),
        attributes,
        system_attributes,
        deduplication_id: options.deduplication_id.clone(),
        group_id: options.group_id.clone(),
    })
}

// ============================================================================
// Trace Header Validation
// ============================================================================

fn root_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^1-[0-9a-f]{8}-[0-9a-f]{24}$").expect("static trace root pattern"))
}

fn parent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9a-f]{16}$").expect("static trace parent pattern"))
}

/// Check the syntax of an `AWSTraceHeader` value.
///
/// The header is a `;` separated list of `key=value` segments. `Root` is
/// required; `Parent` and `Sampled` are checked when present and any other
/// key is passed through.
pub fn validate_trace_header(header: &str) -> Result<(), SqsError> {
    let invalid = || SqsError::InvalidTraceHeader {
        value: header.to_string(),
    };

    let mut has_root = false;
    for segment in header.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = segment.split_once('=').ok_or_else(invalid)?;
        let valid = match key.trim() {
            "Root" => {
                has_root = true;
                root_pattern().is_match(value.trim())
            }
            "Parent" => parent_pattern().is_match(value.trim()),
            "Sampled" => matches!(value.trim(), "0" | "1" | "?" | "d"),
            "" => false,
            _ => true,
        };
        if !valid {
            return Err(invalid());
        }
    }

    if has_root {
        Ok(())
    } else {
        Err(invalid())
    }
}
