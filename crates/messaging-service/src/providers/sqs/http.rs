//! AWS SQS client over the HTTP query API.
//!
//! Requests are form-encoded POSTs signed with AWS Signature Version 4 and
//! responses are XML documents.
//!
//! ## Endpoint
//!
//! By default requests go to `https://sqs.{region}.amazonaws.com`. Setting
//! [`MessagingConfig::endpoint`] points the client elsewhere, for example at
//! LocalStack.
//!
//! ## Timeouts
//!
//! Every call is bounded by [`MessagingConfig::api_call_timeout_seconds`],
//! which has to be longer than the long-poll wait or every empty receive would
//! time out.

use super::{MessageAttributeValue, SendMessageRequest, SqsApi, SqsError, SqsMessage};
use crate::error::ConfigurationError;
use crate::provider::{AwsCredentials, MessagingConfig, ProviderKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use url::Url;

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    credentials: AwsCredentials,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(credentials: AwsCredentials, region: String) -> Self {
        Self {
            credentials,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign a request, returning the headers to add to it
    ///
    /// Signs `host` and `x-amz-date` (plus `x-amz-security-token` for temporary
    /// credentials). The query string is always empty since all parameters
    /// travel in the body.
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical headers (must be sorted)
        let mut canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let mut signed_headers = "host;x-amz-date".to_string();
        if let Some(token) = &self.credentials.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token));
            signed_headers.push_str(";x-amz-security-token");
        }

        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, "", canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.signing_key(&date_stamp);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.credentials.access_key_id, credential_scope, signed_headers, signature
        );

        let mut headers = vec![
            ("Authorization".to_string(), authorization),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers
    }

    /// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
    fn signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

// ============================================================================
// HTTP Client
// ============================================================================

/// [`SqsApi`] implementation talking to the SQS query API
pub struct HttpSqsClient {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    endpoint: Url,
    host: String,
}

impl HttpSqsClient {
    /// Create a client from configuration
    ///
    /// Credentials are optional at construction; calls made without them fail
    /// with [`SqsError::Authentication`].
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(config: &MessagingConfig) -> Result<Self, ConfigurationError> {
        let endpoint_text = config.resolved_endpoint();
        let endpoint = Url::parse(&endpoint_text).map_err(|e| ConfigurationError::Invalid {
            key: "MESSAGING_SERVICE_ENDPOINT".to_string(),
            message: format!("'{}': {}", endpoint_text, e),
        })?;

        let host_name = endpoint
            .host_str()
            .ok_or_else(|| ConfigurationError::Invalid {
                key: "MESSAGING_SERVICE_ENDPOINT".to_string(),
                message: format!("'{}' has no host", endpoint_text),
            })?;
        // The signed host must match the Host header reqwest sends, which
        // carries the port only when it is not the scheme default.
        let host = match endpoint.port() {
            Some(port) => format!("{}:{}", host_name, port),
            None => host_name.to_string(),
        };

        let signer = config
            .credentials
            .as_ref()
            .map(|credentials| AwsV4Signer::new(credentials.clone(), config.region.clone()));

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(
                config.api_call_timeout_seconds,
            ))
            .build()
            .map_err(|e| ConfigurationError::Client {
                provider: ProviderKind::Sqs,
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            signer,
            endpoint,
            host,
        })
    }

    /// POST one signed action and return the response body
    async fn call(&self, action: &str, params: Vec<(String, String)>) -> Result<String, SqsError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| SqsError::Authentication("No credentials configured".to_string()))?;

        let mut form = params;
        form.push(("Action".to_string(), action.to_string()));
        form.push(("Version".to_string(), API_VERSION.to_string()));
        let body = encode_form(&mut form);

        let headers = signer.sign_request(
            "POST",
            &self.host,
            self.endpoint.path(),
            &body,
            &Utc::now(),
        );

        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        debug!(action = %action, endpoint = %self.endpoint, "Calling SQS");

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let response_body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let error = parse_error_response(&response_body, status.as_u16());
            debug!(action = %action, status = status.as_u16(), error = %error, "SQS call failed");
            return Err(error);
        }

        Ok(response_body)
    }
}

impl fmt::Debug for HttpSqsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSqsClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

#[async_trait]
impl SqsApi for HttpSqsClient {
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, SqsError> {
        let response = self
            .call(
                "GetQueueUrl",
                vec![("QueueName".to_string(), queue_name.to_string())],
            )
            .await?;

        first_element_text(&response, b"QueueUrl")?
            .ok_or_else(|| SqsError::Response("QueueUrl not found in response".to_string()))
    }

    async fn send_message(
        &self,
        queue_url: &str,
        request: &SendMessageRequest,
    ) -> Result<String, SqsError> {
        let response = self
            .call("SendMessage", send_message_params(queue_url, request))
            .await?;

        first_element_text(&response, b"MessageId")?
            .ok_or_else(|| SqsError::Response("MessageId not found in response".to_string()))
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_number_of_messages: u32,
        wait_time_seconds: u32,
    ) -> Result<Vec<SqsMessage>, SqsError> {
        let params = vec![
            ("QueueUrl".to_string(), queue_url.to_string()),
            (
                "MaxNumberOfMessages".to_string(),
                max_number_of_messages.to_string(),
            ),
            ("WaitTimeSeconds".to_string(), wait_time_seconds.to_string()),
            ("MessageAttributeName.1".to_string(), "All".to_string()),
        ];

        let response = self.call("ReceiveMessage", params).await?;
        parse_receive_message_response(&response)
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), SqsError> {
        let params = vec![
            ("QueueUrl".to_string(), queue_url.to_string()),
            ("ReceiptHandle".to_string(), receipt_handle.to_string()),
        ];

        // DeleteMessage returns an empty result on success
        self.call("DeleteMessage", params).await?;
        Ok(())
    }
}

fn transport_error(error: reqwest::Error) -> SqsError {
    if error.is_timeout() {
        SqsError::Timeout(error.to_string())
    } else {
        SqsError::Network(error.to_string())
    }
}

// ============================================================================
// Request Encoding
// ============================================================================

/// Sort and form-encode request parameters
fn encode_form(params: &mut [(String, String)]) -> String {
    params.sort();
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn send_message_params(queue_url: &str, request: &SendMessageRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("QueueUrl".to_string(), queue_url.to_string()),
        ("MessageBody".to_string(), request.body.clone()),
    ];

    for (index, (name, value)) in request.message_attributes.iter().enumerate() {
        let prefix = format!("MessageAttribute.{}", index + 1);
        params.push((format!("{}.Name", prefix), name.clone()));
        params.push((format!("{}.Value.DataType", prefix), value.data_type.clone()));
        if let Some(text) = &value.string_value {
            params.push((format!("{}.Value.StringValue", prefix), text.clone()));
        }
        if let Some(binary) = &value.binary_value {
            params.push((format!("{}.Value.BinaryValue", prefix), binary.clone()));
        }
    }

    if let Some(group_id) = &request.message_group_id {
        params.push(("MessageGroupId".to_string(), group_id.clone()));
    }
    if let Some(deduplication_id) = &request.message_deduplication_id {
        params.push((
            "MessageDeduplicationId".to_string(),
            deduplication_id.clone(),
        ));
    }

    params
}

// ============================================================================
// Response Parsing
// ============================================================================

fn xml_error(error: impl fmt::Display) -> SqsError {
    SqsError::Response(format!("XML parsing error: {}", error))
}

/// Text of the first element with the given name
fn first_element_text(xml: &str, element: &[u8]) -> Result<Option<String>, SqsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut inside = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == element => inside = true,
            Ok(Event::Text(e)) if inside => {
                return e.unescape().map(|s| Some(s.into_owned())).map_err(xml_error);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == element => return Ok(Some(String::new())),
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }
}

/// Fields of a `<Message>` element collected while parsing
#[derive(Default)]
struct PartialMessage {
    message_id: Option<String>,
    receipt_handle: Option<String>,
    body: String,
    attributes: HashMap<String, MessageAttributeValue>,
}

/// Fields of a `<MessageAttribute>` element collected while parsing
#[derive(Default)]
struct PartialAttribute {
    name: Option<String>,
    data_type: Option<String>,
    string_value: Option<String>,
    binary_value: Option<String>,
}

/// Parse a ReceiveMessage response, keeping the order SQS returned
///
/// Only message attributes (`<MessageAttribute>`) are collected; system
/// attributes (`<Attribute>`) are ignored.
///
/// Text is not trimmed: bodies and attribute values are returned exactly as
/// sent. Whitespace between elements is dropped by `append_message_text`.
fn parse_receive_message_response(xml: &str) -> Result<Vec<SqsMessage>, SqsError> {
    let mut reader = Reader::from_str(xml);

    let mut messages = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<PartialMessage> = None;
    let mut attribute: Option<PartialAttribute> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"Message" => current = Some(PartialMessage::default()),
                    b"MessageAttribute" if current.is_some() => {
                        attribute = Some(PartialAttribute::default())
                    }
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::End(ref e)) => {
                path.pop();
                match e.name().as_ref() {
                    b"Message" => {
                        if let Some(partial) = current.take() {
                            messages.push(finish_message(partial)?);
                        }
                    }
                    b"MessageAttribute" => {
                        if let (Some(message), Some(attr)) = (current.as_mut(), attribute.take()) {
                            if let Some(name) = attr.name {
                                message.attributes.insert(
                                    name,
                                    MessageAttributeValue {
                                        data_type: attr
                                            .data_type
                                            .map(|t| t.trim().to_string())
                                            .unwrap_or_default(),
                                        string_value: attr.string_value,
                                        binary_value: attr.binary_value,
                                    },
                                );
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                if let Some(message) = current.as_mut() {
                    append_message_text(message, attribute.as_mut(), &path, &text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .map_err(|e| SqsError::Response(format!("Invalid UTF-8 in CDATA: {}", e)))?;
                if let Some(message) = current.as_mut() {
                    append_message_text(message, attribute.as_mut(), &path, &text);
                }
            }
            Ok(Event::Empty(ref e)) => {
                // <StringValue/> is an empty string value, not a missing one
                if e.name().as_ref() == b"StringValue" {
                    if let Some(attr) = attribute.as_mut() {
                        attr.string_value.get_or_insert_with(String::new);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Route element text to the message or attribute field it belongs to
fn append_message_text(
    message: &mut PartialMessage,
    attribute: Option<&mut PartialAttribute>,
    path: &[Vec<u8>],
    text: &str,
) {
    let leaf = path.last().map(Vec::as_slice);
    let parent = path.len().checked_sub(2).map(|i| path[i].as_slice());

    match (parent, leaf, attribute) {
        (Some(b"Message"), Some(b"MessageId"), _) => message
            .message_id
            .get_or_insert_with(String::new)
            .push_str(text),
        (Some(b"Message"), Some(b"ReceiptHandle"), _) => message
            .receipt_handle
            .get_or_insert_with(String::new)
            .push_str(text),
        (Some(b"Message"), Some(b"Body"), _) => message.body.push_str(text),
        (Some(b"MessageAttribute"), Some(b"Name"), Some(attr)) => {
            attr.name.get_or_insert_with(String::new).push_str(text)
        }
        (Some(b"Value"), Some(b"DataType"), Some(attr)) => {
            attr.data_type.get_or_insert_with(String::new).push_str(text)
        }
        (Some(b"Value"), Some(b"StringValue"), Some(attr)) => attr
            .string_value
            .get_or_insert_with(String::new)
            .push_str(text),
        (Some(b"Value"), Some(b"BinaryValue"), Some(attr)) => attr
            .binary_value
            .get_or_insert_with(String::new)
            .push_str(text),
        _ => {}
    }
}

fn finish_message(partial: PartialMessage) -> Result<SqsMessage, SqsError> {
    let message_id = partial
        .message_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SqsError::Response("Message without MessageId".to_string()))?;
    let receipt_handle = partial
        .receipt_handle
        .map(|handle| handle.trim().to_string())
        .filter(|handle| !handle.is_empty())
        .ok_or_else(|| {
            SqsError::Response(format!("Message {} without ReceiptHandle", message_id))
        })?;

    Ok(SqsMessage {
        message_id,
        receipt_handle,
        body: partial.body,
        message_attributes: partial.attributes,
    })
}

/// Parse an SQS error document into a service error
///
/// Bodies that are not error documents produce a service error coded after
/// the HTTP status.
fn parse_error_response(xml: &str, status: u16) -> SqsError {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_error = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = true,
                b"Code" if in_error => in_code = true,
                b"Message" if in_error => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = false,
                b"Code" => in_code = false,
                b"Message" => in_message = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    SqsError::Service {
        code: error_code.unwrap_or_else(|| format!("HTTP{}", status)),
        message: error_message.unwrap_or_else(|| "Unknown error".to_string()),
        status,
    }
}
