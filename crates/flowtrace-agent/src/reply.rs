// ABOUTME: Classifies one raw model reply into exactly one dispatchable variant.
// ABOUTME: Fence stripping, JSON parsing and key checks all happen here, once.
use flowtrace_core::{FlowStep, ReplyVocabulary};
use serde_json::{Map, Value};

/// A model reply, classified before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    /// Look up a function by name and add its source to the corpus.
    FunctionRequest {
        func_name: String,
        reason: Option<String>,
    },
    /// Append one hop to the trace.
    FlowStepRecord(FlowStep),
    /// End the trace now.
    StopSignal,
    /// Anything else; the round is consumed and state is left alone.
    Malformed(String),
}

impl ParsedReply {
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedReply::FunctionRequest { .. } => "function_request",
            ParsedReply::FlowStepRecord(_) => "flow_step",
            ParsedReply::StopSignal => "stop",
            ParsedReply::Malformed(_) => "malformed",
        }
    }
}

/// Drop every ```` ```json ```` and ```` ``` ```` marker and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Priority: lookup request, then stop, then step. Unparseable text and
/// objects matching none of them are `Malformed`.
pub fn parse_reply(raw: &str, vocabulary: &ReplyVocabulary) -> ParsedReply {
    let content = strip_code_fences(raw);
    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => return ParsedReply::Malformed(format!("not valid JSON: {}", e)),
    };
    let object = match value.as_object() {
        Some(object) => object,
        None => return ParsedReply::Malformed("reply is not a JSON object".to_string()),
    };

    let action = object.get(&vocabulary.action_key).and_then(Value::as_str);

    let requests_lookup = action == Some(vocabulary.fetch_action.as_str())
        || (vocabulary.fetch_on_func_name_key && object.contains_key(&vocabulary.func_name_key));
    if requests_lookup {
        return match object
            .get(&vocabulary.func_name_key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(name) => ParsedReply::FunctionRequest {
                func_name: name.to_string(),
                reason: object
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            None => ParsedReply::Malformed(format!(
                "lookup request without a usable '{}'",
                vocabulary.func_name_key
            )),
        };
    }

    if let (Some(stop), Some(action)) = (vocabulary.stop_action.as_deref(), action) {
        if action == stop {
            return ParsedReply::StopSignal;
        }
    }

    if ["file", "line", "code", "desc"]
        .iter()
        .all(|key| object.contains_key(*key))
    {
        return match parse_step(object) {
            Ok(step) => ParsedReply::FlowStepRecord(step),
            Err(reason) => ParsedReply::Malformed(reason),
        };
    }

    ParsedReply::Malformed("no recognized reply shape".to_string())
}

fn parse_step(object: &Map<String, Value>) -> Result<FlowStep, String> {
    let text = |key: &str| -> Result<String, String> {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| format!("step field '{}' is not a string", key))
    };

    let line = match object.get("line") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .and_then(|n| u32::try_from(n).ok())
    .filter(|n| *n > 0)
    .ok_or_else(|| "step field 'line' is not a positive integer".to_string())?;

    Ok(FlowStep {
        file: text("file")?,
        line,
        code: text("code")?,
        desc: text("desc")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrace_core::TraceConfig;

    fn privacy() -> ReplyVocabulary {
        TraceConfig::privacy().vocabulary
    }

    fn classic() -> ReplyVocabulary {
        TraceConfig::classic().vocabulary
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n[]\n```\n"), "[]");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn parses_tagged_lookup_with_reason() {
        let reply = r#"```json
{"action": "GetFuncImpl", "func_name": "openGallery", "reason": "returns the uri"}
```"#;
        assert_eq!(
            parse_reply(reply, &privacy()),
            ParsedReply::FunctionRequest {
                func_name: "openGallery".to_string(),
                reason: Some("returns the uri".to_string()),
            }
        );
    }

    #[test]
    fn bare_func_name_key_requests_lookup() {
        let reply = r#"{"func_name": "copyFileToCache"}"#;
        assert!(matches!(
            parse_reply(reply, &classic()),
            ParsedReply::FunctionRequest { ref func_name, reason: None } if func_name == "copyFileToCache"
        ));
    }

    #[test]
    fn bare_func_name_key_is_ignored_when_disabled() {
        let mut vocabulary = privacy();
        vocabulary.fetch_on_func_name_key = false;
        let reply = r#"{"func_name": "copyFileToCache"}"#;
        assert_eq!(parse_reply(reply, &vocabulary).kind(), "malformed");
    }

    #[test]
    fn lookup_without_name_is_malformed() {
        let reply = r#"{"action": "GetFuncImpl", "func_name": "  "}"#;
        assert_eq!(parse_reply(reply, &privacy()).kind(), "malformed");
        let reply = r#"{"action": "GetFuncImpl"}"#;
        assert_eq!(parse_reply(reply, &privacy()).kind(), "malformed");
    }

    #[test]
    fn stop_only_with_stop_vocabulary() {
        let reply = r#"{"action": "stop"}"#;
        assert_eq!(parse_reply(reply, &privacy()), ParsedReply::StopSignal);
        assert_eq!(parse_reply(reply, &classic()).kind(), "malformed");
    }

    #[test]
    fn lookup_outranks_stop_and_step() {
        let reply = r#"{"action": "stop", "func_name": "f", "file": "a.ts", "line": 1, "code": "x", "desc": "d"}"#;
        assert_eq!(parse_reply(reply, &privacy()).kind(), "function_request");
    }

    #[test]
    fn parses_step_with_numeric_or_string_line() {
        let reply = r#"{"file": "Mine.ets", "line": 24, "code": "this.imgPath = uri;", "desc": "stored"}"#;
        assert_eq!(
            parse_reply(reply, &privacy()),
            ParsedReply::FlowStepRecord(FlowStep::new(
                "Mine.ets",
                24,
                "this.imgPath = uri;",
                "stored"
            ))
        );

        let reply = r#"{"file": "Mine.ets", "line": "23", "code": "uri = r", "desc": "d"}"#;
        match parse_reply(reply, &privacy()) {
            ParsedReply::FlowStepRecord(step) => assert_eq!(step.line, 23),
            other => panic!("expected a step, got {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_step_lines() {
        for line in [r#"0"#, r#"-3"#, r#"2.5"#, r#""twelve""#, "null"] {
            let reply = format!(
                r#"{{"file": "a.ts", "line": {}, "code": "x", "desc": "d"}}"#,
                line
            );
            assert_eq!(parse_reply(&reply, &privacy()).kind(), "malformed", "line {}", line);
        }
    }

    #[test]
    fn incomplete_step_is_malformed() {
        let reply = r#"{"file": "a.ts", "line": 3, "code": "x"}"#;
        assert_eq!(parse_reply(reply, &privacy()).kind(), "malformed");
    }

    #[test]
    fn prose_and_arrays_are_malformed() {
        assert_eq!(
            parse_reply("I think the value flows into the picker.", &privacy()).kind(),
            "malformed"
        );
        assert_eq!(parse_reply("[1, 2, 3]", &privacy()).kind(), "malformed");
    }
}
