//! UI message stream frames and the assembler that produces them.
//!
//! [`MessageAssembler`] is fed [`ModelEvent`]s in order. For each one it
//! returns the frames to send to the client, and in parallel it builds the
//! [`MessagePart`]s of the assistant message that will be persisted once
//! the invocation ends. Text and reasoning blocks are opened lazily and
//! closed whenever a different kind of event arrives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MessagePart, ModelEvent, TokenUsage, ToolState};
use crate::domain::foundation::MessageId;

/// Text sent to the client when the model fails mid-stream.
pub const STREAM_ERROR_TEXT: &str = "Oops, an error occurred!";

/// One frame of the UI message stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiStreamEvent {
    Start {
        message_id: String,
    },
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    FinishStep,
    Finish,
    Error {
        error_text: String,
    },
    /// Persisted message replayed to a reconnecting client, as a JSON string.
    #[serde(rename = "data-appendMessage")]
    DataAppendMessage {
        data: String,
        #[serde(default)]
        transient: bool,
    },
}

impl UiStreamEvent {
    pub fn error(text: impl Into<String>) -> Self {
        UiStreamEvent::Error {
            error_text: text.into(),
        }
    }

    /// Serialized frame payload.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Reasoning,
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    id: String,
    part_index: usize,
}

/// Translates model events into stream frames and message parts.
#[derive(Debug)]
pub struct MessageAssembler {
    message_id: MessageId,
    forward_reasoning: bool,
    parts: Vec<MessagePart>,
    open: Option<OpenBlock>,
    next_block: usize,
    usage: TokenUsage,
}

impl MessageAssembler {
    pub fn new(message_id: MessageId, forward_reasoning: bool) -> Self {
        Self {
            message_id,
            forward_reasoning,
            parts: Vec::new(),
            open: None,
            next_block: 0,
            usage: TokenUsage::default(),
        }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// The opening frame announcing the assistant message id.
    pub fn start(&self) -> UiStreamEvent {
        UiStreamEvent::Start {
            message_id: self.message_id.to_string(),
        }
    }

    /// Frames for one model event.
    pub fn apply(&mut self, event: ModelEvent) -> Vec<UiStreamEvent> {
        let mut frames = Vec::new();
        match event {
            ModelEvent::StepStart => {
                self.close_block(&mut frames);
                self.parts.push(MessagePart::StepStart);
                frames.push(UiStreamEvent::StartStep);
            }
            ModelEvent::TextDelta(delta) => {
                if !delta.is_empty() {
                    let id = self.extend_block(BlockKind::Text, &delta, &mut frames);
                    frames.push(UiStreamEvent::TextDelta { id, delta });
                }
            }
            ModelEvent::ReasoningDelta(delta) => {
                if self.forward_reasoning && !delta.is_empty() {
                    let id = self.extend_block(BlockKind::Reasoning, &delta, &mut frames);
                    frames.push(UiStreamEvent::ReasoningDelta { id, delta });
                }
            }
            ModelEvent::ToolCall(call) => {
                self.close_block(&mut frames);
                self.parts.push(MessagePart::DynamicTool {
                    tool_name: call.name.clone(),
                    tool_call_id: call.id.clone(),
                    state: ToolState::InputAvailable,
                    input: call.arguments.clone(),
                    output: None,
                    error_text: None,
                });
                frames.push(UiStreamEvent::ToolInputAvailable {
                    tool_call_id: call.id,
                    tool_name: call.name,
                    input: call.arguments,
                });
            }
            ModelEvent::ToolResult {
                tool_call_id,
                output,
                ..
            } => {
                self.close_block(&mut frames);
                self.settle_tool(&tool_call_id, &output);
                frames.push(match output {
                    Ok(output) => UiStreamEvent::ToolOutputAvailable {
                        tool_call_id,
                        output,
                    },
                    Err(error_text) => UiStreamEvent::ToolOutputError {
                        tool_call_id,
                        error_text,
                    },
                });
            }
            ModelEvent::StepFinish { .. } => {
                self.close_block(&mut frames);
                frames.push(UiStreamEvent::FinishStep);
            }
            ModelEvent::Finish { usage, .. } => {
                self.close_block(&mut frames);
                self.usage = usage;
                frames.push(UiStreamEvent::Finish);
            }
        }
        frames
    }

    /// Frames for a mid-stream failure.
    pub fn fail(&mut self) -> Vec<UiStreamEvent> {
        let mut frames = Vec::new();
        self.close_block(&mut frames);
        frames.push(UiStreamEvent::error(STREAM_ERROR_TEXT));
        frames
    }

    /// Parts accumulated so far and the reported usage.
    pub fn into_parts(self) -> (Vec<MessagePart>, TokenUsage) {
        (self.parts, self.usage)
    }

    /// True if no parts have been accumulated, step markers included.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn extend_block(
        &mut self,
        kind: BlockKind,
        delta: &str,
        frames: &mut Vec<UiStreamEvent>,
    ) -> String {
        if self.open.as_ref().map(|block| block.kind) != Some(kind) {
            self.close_block(frames);
            let id = format!(
                "{}-{}",
                match kind {
                    BlockKind::Text => "text",
                    BlockKind::Reasoning => "reasoning",
                },
                self.next_block
            );
            self.next_block += 1;
            self.parts.push(match kind {
                BlockKind::Text => MessagePart::text(""),
                BlockKind::Reasoning => MessagePart::Reasoning {
                    text: String::new(),
                },
            });
            frames.push(match kind {
                BlockKind::Text => UiStreamEvent::TextStart { id: id.clone() },
                BlockKind::Reasoning => UiStreamEvent::ReasoningStart { id: id.clone() },
            });
            self.open = Some(OpenBlock {
                kind,
                id,
                part_index: self.parts.len() - 1,
            });
        }

        match self.open.as_ref() {
            Some(block) => {
                if let Some(MessagePart::Text { text } | MessagePart::Reasoning { text }) =
                    self.parts.get_mut(block.part_index)
                {
                    text.push_str(delta);
                }
                block.id.clone()
            }
            None => String::new(),
        }
    }

    fn close_block(&mut self, frames: &mut Vec<UiStreamEvent>) {
        if let Some(block) = self.open.take() {
            frames.push(match block.kind {
                BlockKind::Text => UiStreamEvent::TextEnd { id: block.id },
                BlockKind::Reasoning => UiStreamEvent::ReasoningEnd { id: block.id },
            });
        }
    }

    fn settle_tool(&mut self, call_id: &str, result: &Result<Value, String>) {
        let part = self.parts.iter_mut().rev().find(|part| {
            matches!(part, MessagePart::DynamicTool { tool_call_id, .. } if tool_call_id == call_id)
        });
        if let Some(MessagePart::DynamicTool {
            state,
            output,
            error_text,
            ..
        }) = part
        {
            match result {
                Ok(value) => {
                    *state = ToolState::OutputAvailable;
                    *output = Some(value.clone());
                }
                Err(message) => {
                    *state = ToolState::OutputError;
                    *error_text = Some(message.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::{FinishReason, ToolCall};
    use serde_json::json;

    fn assembler() -> MessageAssembler {
        MessageAssembler::new(MessageId::new("a1").unwrap(), true)
    }

    fn frame_types(frames: &[UiStreamEvent]) -> Vec<String> {
        frames
            .iter()
            .map(|f| serde_json::to_value(f).unwrap()["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn frames_serialize_to_ui_stream_shape() {
        let frame = UiStreamEvent::Start {
            message_id: "a1".into(),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "type": "start", "messageId": "a1" })
        );

        let frame = UiStreamEvent::TextDelta {
            id: "text-0".into(),
            delta: "Hi".into(),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "type": "text-delta", "id": "text-0", "delta": "Hi" })
        );

        let frame = UiStreamEvent::ToolOutputError {
            tool_call_id: "call_1".into(),
            error_text: "boom".into(),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "type": "tool-output-error", "toolCallId": "call_1", "errorText": "boom" })
        );

        let frame = UiStreamEvent::DataAppendMessage {
            data: "{}".into(),
            transient: true,
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap()["type"],
            "data-appendMessage"
        );
        assert_eq!(
            serde_json::to_value(UiStreamEvent::StartStep).unwrap(),
            json!({ "type": "start-step" })
        );
    }

    #[test]
    fn text_deltas_share_one_block_until_step_ends() {
        let mut asm = assembler();
        let mut frames = asm.apply(ModelEvent::StepStart);
        frames.extend(asm.apply(ModelEvent::TextDelta("Hello ".into())));
        frames.extend(asm.apply(ModelEvent::TextDelta("world".into())));
        frames.extend(asm.apply(ModelEvent::StepFinish {
            reason: FinishReason::Stop,
            usage: TokenUsage::new(3, 2),
        }));
        frames.extend(asm.apply(ModelEvent::Finish {
            reason: FinishReason::Stop,
            usage: TokenUsage::new(3, 2),
        }));

        assert_eq!(
            frame_types(&frames),
            vec![
                "start-step",
                "text-start",
                "text-delta",
                "text-delta",
                "text-end",
                "finish-step",
                "finish"
            ]
        );

        let (parts, usage) = asm.into_parts();
        assert_eq!(parts, vec![MessagePart::StepStart, MessagePart::text("Hello world")]);
        assert_eq!(usage, TokenUsage::new(3, 2));
    }

    #[test]
    fn switching_from_reasoning_to_text_closes_the_block() {
        let mut asm = assembler();
        let mut frames = asm.apply(ModelEvent::ReasoningDelta("think".into()));
        frames.extend(asm.apply(ModelEvent::TextDelta("answer".into())));

        assert_eq!(
            frame_types(&frames),
            vec!["reasoning-start", "reasoning-delta", "reasoning-end", "text-start", "text-delta"]
        );
        assert!(matches!(&frames[4], UiStreamEvent::TextDelta { id, .. } if id == "text-1"));
    }

    #[test]
    fn reasoning_is_dropped_when_not_forwarded() {
        let mut asm = MessageAssembler::new(MessageId::new("a1").unwrap(), false);
        assert!(asm.apply(ModelEvent::ReasoningDelta("secret".into())).is_empty());
        assert!(asm.is_empty());
    }

    #[test]
    fn step_marker_alone_counts_as_content() {
        let mut asm = assembler();
        asm.apply(ModelEvent::StepStart);
        assert!(!asm.is_empty());
    }

    #[test]
    fn tool_results_settle_the_matching_part() {
        let mut asm = assembler();
        asm.apply(ModelEvent::ToolCall(ToolCall {
            id: "call_1".into(),
            name: "lookup".into(),
            arguments: json!({ "q": "x" }),
        }));
        let frames = asm.apply(ModelEvent::ToolResult {
            tool_call_id: "call_1".into(),
            tool_name: "lookup".into(),
            output: Err("unknown tool".into()),
        });

        assert_eq!(frame_types(&frames), vec!["tool-output-error"]);
        let (parts, _) = asm.into_parts();
        assert!(matches!(
            &parts[0],
            MessagePart::DynamicTool { state: ToolState::OutputError, error_text: Some(e), .. } if e == "unknown tool"
        ));
    }

    #[test]
    fn failure_closes_open_block_and_reports_error() {
        let mut asm = assembler();
        asm.apply(ModelEvent::TextDelta("partial".into()));
        let frames = asm.fail();

        assert_eq!(frame_types(&frames), vec!["text-end", "error"]);
        assert_eq!(frames[1], UiStreamEvent::error(STREAM_ERROR_TEXT));
        assert!(!asm.is_empty());
    }

    #[test]
    fn start_frame_announces_message_id() {
        let asm = assembler();
        assert_eq!(
            asm.start(),
            UiStreamEvent::Start {
                message_id: "a1".into()
            }
        );
    }
}
