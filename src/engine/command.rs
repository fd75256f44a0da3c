use serde::{Deserialize, Serialize};

/// Commands accepted by the engine's management channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    Jump(JumpTaskCommand),
}

/// Moves an execution straight to another flow node, bypassing normal completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumpTaskCommand {
    pub execution_id: String,
    pub target_task_key: String,
}

impl JumpTaskCommand {
    pub fn new(execution_id: impl Into<String>, target_task_key: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            target_task_key: target_task_key.into(),
        }
    }
}

impl From<JumpTaskCommand> for Command {
    fn from(cmd: JumpTaskCommand) -> Self {
        Command::Jump(cmd)
    }
}
