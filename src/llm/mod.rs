//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化 Mock）

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use message::{Message, Role};
pub use mock::{ScriptedLlmClient, ScriptedReply};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;

use crate::config::LlmSection;
use crate::core::CurriculumError;

/// 按 [llm] 配置创建客户端：deepseek / openai / mock
pub fn create_client(section: &LlmSection) -> Result<Arc<dyn LlmClient>, CurriculumError> {
    let timeout = Duration::from_secs(section.timeouts.request);
    match section.provider.as_str() {
        "deepseek" => Ok(Arc::new(create_deepseek_client(
            section.model.as_deref(),
            timeout,
        ))),
        "openai" => {
            let model = section.model.as_deref().unwrap_or("gpt-4o-mini");
            Ok(Arc::new(OpenAiClient::new(
                section.base_url.as_deref(),
                model,
                None,
                timeout,
            )))
        }
        "mock" => Ok(Arc::new(ScriptedLlmClient::default())),
        other => Err(CurriculumError::Config(format!("unknown llm provider: {other}"))),
    }
}
