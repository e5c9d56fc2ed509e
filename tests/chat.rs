//! Completion stream assembly integration tests
//!
//! Feeds synthetic stream chunks (as they arrive off the wire) through the
//! accumulator and checks the assembled result.

use parley::StreamAccumulator;
use parley::chat::ChatChunk;

fn parse(data: &str) -> ChatChunk {
    serde_json::from_str(data).expect("chunk should parse")
}

#[test]
fn assembles_content_across_many_increments() {
    let mut acc = StreamAccumulator::default();
    for fragment in ["The ", "lights ", "are ", "now ", "on."] {
        acc.push(parse(&format!(
            r#"{{"choices":[{{"delta":{{"content":"{fragment}"}}}}]}}"#
        )));
    }

    let completion = acc.finish();
    assert_eq!(completion.text, "The lights are now on.");
    assert!(completion.tool_calls.is_empty());
}

#[test]
fn assembles_tool_call_from_indexed_deltas() {
    // The canonical split: name in two fragments, arguments in two fragments
    let deltas = [
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_"}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"weather"}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"c"}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ity\":\"NYC\"}"}}]}}]}"#,
    ];

    let mut acc = StreamAccumulator::default();
    for delta in deltas {
        acc.push(parse(delta));
    }

    let completion = acc.finish();
    assert_eq!(completion.tool_calls.len(), 1);

    let call = &completion.tool_calls[0];
    assert_eq!(call.function.name, "get_weather");
    assert_eq!(call.function.arguments, r#"{"city":"NYC"}"#);
    assert_eq!(call.id, "call_1");
}

#[test]
fn interleaved_indices_assemble_independently() {
    let deltas = [
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"alpha"}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"b","function":{"name":"beta"}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{}"}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"function":{"arguments":"{\"x\":1}"}}]}}]}"#,
    ];

    let mut acc = StreamAccumulator::default();
    for delta in deltas {
        acc.push(parse(delta));
    }

    let completion = acc.finish();
    assert_eq!(completion.tool_calls.len(), 2);
    assert_eq!(completion.tool_calls[0].id, "a");
    assert_eq!(completion.tool_calls[0].function.arguments, "{}");
    assert_eq!(completion.tool_calls[1].id, "b");
    assert_eq!(completion.tool_calls[1].function.arguments, r#"{"x":1}"#);
}

#[test]
fn mixed_content_and_tool_deltas_in_one_chunk() {
    let mut acc = StreamAccumulator::default();
    acc.push(parse(
        r#"{"choices":[{"delta":{"content":"Checking","tool_calls":[{"index":0,"id":"c","function":{"name":"lookup","arguments":"{}"}}]}}]}"#,
    ));

    let completion = acc.finish();
    assert_eq!(completion.text, "Checking");
    assert_eq!(completion.tool_calls.len(), 1);
}

#[test]
fn chunks_with_no_choices_are_ignored() {
    let mut acc = StreamAccumulator::default();
    acc.push(parse(r#"{"choices":[]}"#));
    acc.push(parse(r#"{}"#));

    let completion = acc.finish();
    assert!(completion.text.is_empty());
    assert!(completion.tool_calls.is_empty());
}

#[test]
fn declined_answer_is_a_valid_empty_completion() {
    // A model may legitimately stream nothing: no text, no tool calls
    let mut acc = StreamAccumulator::default();
    acc.push(parse(r#"{"choices":[{"delta":{}}]}"#));

    let completion = acc.finish();
    assert!(completion.text.is_empty());
    assert!(completion.tool_calls.is_empty());
}
