//! ElevenLabs Conversational AI connection settings.

/// ConvAI WebSocket endpoint.
pub const ELEVENLABS_CONVAI_URL: &str = "wss://api.elevenlabs.io/v1/convai/conversation";

/// ConvAI exchanges PCM16 mono at 16kHz in both directions.
pub const ELEVENLABS_SAMPLE_RATE: u32 = 16000;

/// Build the conversation URL for a hosted agent.
pub fn conversation_url(endpoint: &str, agent_id: &str) -> String {
    format!("{endpoint}?agent_id={agent_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_url() {
        assert_eq!(
            conversation_url(ELEVENLABS_CONVAI_URL, "agent_1"),
            "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=agent_1"
        );
    }
}
