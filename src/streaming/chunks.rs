use serde_json::Value;

pub fn extract_first_choice(chunk: &Value) -> Option<&Value> {
    chunk
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|array| array.first())
}

/// Text increment carried by `choices[0].delta.content`, if any.
pub fn extract_delta_content(event: &Value) -> Option<String> {
    let content_value = extract_first_choice(event)?
        .get("delta")?
        .get("content")?;

    let mut content = String::new();
    append_stream_content(content_value, &mut content);

    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

fn append_stream_content(content_value: &Value, buffer: &mut String) {
    match content_value {
        Value::String(text) => buffer.push_str(text),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(text) => buffer.push_str(text),
                    _ => {
                        if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                            buffer.push_str(text);
                        }
                    }
                }
            }
        }
        Value::Object(obj) => {
            if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                buffer.push_str(text);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_string_delta() {
        let event = json!({"choices": [{"delta": {"content": "Hi"}}]});
        assert_eq!(extract_delta_content(&event).as_deref(), Some("Hi"));
    }

    #[test]
    fn joins_content_part_arrays() {
        let event = json!({"choices": [{"delta": {"content": [
            {"type": "text", "text": "Hel"},
            {"type": "text", "text": "lo"}
        ]}}]});
        assert_eq!(extract_delta_content(&event).as_deref(), Some("Hello"));
    }

    #[test]
    fn empty_or_missing_content_yields_nothing() {
        assert_eq!(
            extract_delta_content(&json!({"choices": [{"delta": {"content": ""}}]})),
            None
        );
        assert_eq!(
            extract_delta_content(&json!({"choices": [{"delta": {"role": "assistant"}}]})),
            None
        );
        assert_eq!(extract_delta_content(&json!({"choices": []})), None);
        assert_eq!(
            extract_delta_content(&json!({"choices": [{"delta": {"content": null}}]})),
            None
        );
    }

    #[test]
    fn only_first_choice_is_used() {
        let event = json!({"choices": [
            {"delta": {"content": "a"}},
            {"delta": {"content": "b"}}
        ]});
        assert_eq!(extract_delta_content(&event).as_deref(), Some("a"));
    }
}
