//! Recorder operations: the four boundaries plus prompt/final steps.
//!
//! Every operation redacts, hashes, and appends under the scope's append
//! lock. A policy denial records an `error.event` step carrying the reason
//! and a redacted summary of the denied call, *then* surfaces to the caller;
//! artifacts always explain why a boundary was skipped.

use serde_json::{json, Map, Value};

use rpk_core::ids::StepId;
use rpk_core::policy::host_of;
use rpk_core::step::{Step, StepType};
use rpk_io::hasher::step_hash;

use crate::scope::CaptureScope;
use crate::CaptureError;

impl CaptureScope {
    /// Record a prompt template instantiation.
    pub fn record_prompt_render(
        &self,
        template: Value,
        rendered: Value,
        metadata: Value,
    ) -> Result<StepId, CaptureError> {
        self.append(StepType::PromptRender, template, rendered, metadata)
    }

    /// Record one model call as a request/response step pair.
    pub fn record_model_call(
        &self,
        request: Value,
        response: Value,
        metadata: Value,
    ) -> Result<(StepId, StepId), CaptureError> {
        self.check_boundary(self.inner.intercept.allow_model, "model", &request)?;
        let req = self.append(
            StepType::ModelRequest,
            request,
            Value::Null,
            metadata.clone(),
        )?;
        let resp = self.append(StepType::ModelResponse, Value::Null, response, metadata)?;
        Ok((req, resp))
    }

    /// Record a model call whose response arrived as an ordered delta
    /// sequence. Stores the event list (1-based indices), a completion flag,
    /// and the deterministic `assembled_text` replay and diff consume.
    pub fn record_model_stream(
        &self,
        request: Value,
        deltas: &[String],
        complete: bool,
        metadata: Value,
    ) -> Result<(StepId, StepId), CaptureError> {
        self.check_boundary(self.inner.intercept.allow_model, "model", &request)?;
        let events: Vec<Value> = deltas
            .iter()
            .enumerate()
            .map(|(i, delta)| json!({"index": i + 1, "delta": delta}))
            .collect();
        let assembled: String = deltas.concat();
        let output = json!({
            "assembled_text": assembled,
            "stream": {"events": events, "complete": complete}
        });
        let req = self.append(
            StepType::ModelRequest,
            request,
            Value::Null,
            metadata.clone(),
        )?;
        let resp = self.append(StepType::ModelResponse, Value::Null, output, metadata)?;
        Ok((req, resp))
    }

    /// Record one tool call as a request/response step pair.
    pub fn record_tool_call(
        &self,
        request: Value,
        response: Value,
        metadata: Value,
    ) -> Result<(StepId, StepId), CaptureError> {
        self.check_boundary(self.inner.intercept.allow_tool, "tool", &request)?;
        let req = self.append(
            StepType::ToolRequest,
            request,
            Value::Null,
            metadata.clone(),
        )?;
        let resp = self.append(StepType::ToolResponse, Value::Null, response, metadata)?;
        Ok((req, resp))
    }

    /// Record one HTTP exchange. Rides on the tool step types with
    /// `transport: "http"` metadata; bodies are omitted entirely unless the
    /// policy opts in.
    pub fn record_http_call(
        &self,
        method: &str,
        url: &str,
        request_body: Value,
        response_body: Value,
        metadata: Value,
    ) -> Result<(StepId, StepId), CaptureError> {
        self.check_boundary(
            self.inner.intercept.allow_http,
            "http",
            &json!({"method": method, "url": url}),
        )?;
        let host = host_of(url);
        self.check_host(&host, method, url)?;

        let mut metadata = as_object(metadata);
        metadata.insert("transport".to_string(), json!("http"));
        metadata.insert("method".to_string(), json!(method));
        metadata.insert("url".to_string(), json!(url));

        let capture_bodies = self.inner.intercept.capture_http_bodies;
        if !capture_bodies {
            metadata.insert("body_capture_disabled".to_string(), json!(true));
        }
        let input = if capture_bodies {
            json!({"method": method, "url": url, "body": request_body})
        } else {
            json!({"method": method, "url": url})
        };
        let output = if capture_bodies {
            json!({"body": response_body})
        } else {
            Value::Object(Map::new())
        };

        let metadata = Value::Object(metadata);
        let req = self.append(StepType::ToolRequest, input, Value::Null, metadata.clone())?;
        let resp = self.append(StepType::ToolResponse, Value::Null, output, metadata)?;
        Ok((req, resp))
    }

    /// Record an error observed at a boundary.
    pub fn record_error(
        &self,
        context: Value,
        error: Value,
        metadata: Value,
    ) -> Result<StepId, CaptureError> {
        self.append(StepType::ErrorEvent, context, error, metadata)
    }

    /// Record the program's final output.
    pub fn record_final_output(
        &self,
        output: Value,
        metadata: Value,
    ) -> Result<StepId, CaptureError> {
        self.append(StepType::OutputFinal, Value::Null, output, metadata)
    }

    /* ------------------------- policy enforcement ------------------------ */

    fn check_boundary(
        &self,
        allowed: bool,
        boundary: &'static str,
        request: &Value,
    ) -> Result<(), CaptureError> {
        if allowed {
            return Ok(());
        }
        tracing::warn!(boundary, "boundary denied by interception policy");
        let summary = self.inner.redactor.redact(request);
        // Best effort: the denial record must not mask the denial error.
        let _ = self.append(
            StepType::ErrorEvent,
            json!({"boundary": boundary, "denied_call": summary}),
            json!({"code": "boundary_denied", "reason": format!("{boundary} capture disabled by policy")}),
            json!({}),
        );
        Err(CaptureError::BoundaryDenied { boundary })
    }

    /// Allowlist wins if non-empty, then the blocklist applies.
    fn check_host(&self, host: &str, method: &str, url: &str) -> Result<(), CaptureError> {
        let policy = &self.inner.intercept;
        let allowed = if !policy.allowed_hosts.is_empty() {
            policy.allowed_hosts.contains(host)
        } else {
            !policy.blocked_hosts.contains(host)
        };
        if allowed {
            return Ok(());
        }
        tracing::warn!(host, "http host blocked by interception policy");
        let summary = self
            .inner
            .redactor
            .redact(&json!({"method": method, "url": url}));
        let _ = self.append(
            StepType::ErrorEvent,
            json!({"boundary": "http", "denied_call": summary}),
            json!({"code": "host_blocked", "reason": format!("host {host} not permitted by policy")}),
            json!({}),
        );
        Err(CaptureError::HostBlocked {
            host: host.to_string(),
        })
    }

    /* ------------------------------ append ------------------------------- */

    /// Redact → hash → append under the lock. The hash is computed over the
    /// redacted content so persisted artifacts verify as-is.
    pub(crate) fn append(
        &self,
        step_type: StepType,
        input: Value,
        output: Value,
        metadata: Value,
    ) -> Result<StepId, CaptureError> {
        let input = self.inner.redactor.redact(&input);
        let output = self.inner.redactor.redact(&output);
        let metadata = self
            .inner
            .redactor
            .redact(&Value::Object(as_object(metadata)));
        let hash = step_hash(step_type, &input, &output, &metadata)?;

        let step = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(CaptureError::ScopeClosed);
            }
            let id = StepId::from_index(state.next_index);
            state.next_index += 1;
            let step = Step {
                id,
                step_type,
                input,
                output,
                metadata,
                hash,
                extra: Default::default(),
            };
            state.steps.push(step.clone());
            step
        };

        tracing::debug!(step = %step.id, kind = step.step_type.as_str(), "step recorded");
        if let Some(hooks) = &self.inner.hooks {
            hooks.step(&step);
        }
        Ok(step.id.clone())
    }
}

/// Coerce step metadata to an object; `null` becomes `{}`.
fn as_object(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
