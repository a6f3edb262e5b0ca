//! WebSocket 帧定义
//!
//! 出站只有心跳 `{"type":"PING"}`；入站为状态帧，包含提示消息和累计积分。

use serde::{Deserialize, Deserializer, Serialize};
use tokio_tungstenite::tungstenite::Message;

/// 出站帧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum OutboundFrame {
    /// 心跳
    Ping,
}

impl OutboundFrame {
    /// 序列化为 WebSocket 文本消息
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }
}

/// 入站状态帧
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    /// 服务端提示消息
    pub message: String,
    /// 累计积分，缺省或为 null 时为 0
    #[serde(default, deserialize_with = "null_as_zero")]
    pub points_total: f64,
}

impl StatusFrame {
    /// 从文本帧解析
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// 从二进制帧解析（按 UTF-8 JSON 处理）
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_frame_json() {
        let message = OutboundFrame::Ping.to_message().unwrap();
        assert_eq!(message, Message::Text(r#"{"type":"PING"}"#.to_string()));
    }

    #[test]
    fn test_decode_status_frame() {
        let frame =
            StatusFrame::decode(r#"{"message":"Pulse from server","pointsTotal":1250.5,"extra":1}"#)
                .unwrap();
        assert_eq!(frame.message, "Pulse from server");
        assert_eq!(frame.points_total, 1250.5);
    }

    #[test]
    fn test_decode_missing_points_is_zero() {
        let frame = StatusFrame::decode(r#"{"message":"Connected successfully"}"#).unwrap();
        assert_eq!(frame.points_total, 0.0);

        let frame = StatusFrame::decode(r#"{"message":"x","pointsTotal":null}"#).unwrap();
        assert_eq!(frame.points_total, 0.0);
    }

    #[test]
    fn test_decode_malformed_frames() {
        assert!(StatusFrame::decode("not json").is_err());
        assert!(StatusFrame::decode("[1,2,3]").is_err());
        assert!(StatusFrame::decode(r#"{"pointsTotal":10}"#).is_err());
        assert!(StatusFrame::decode(r#"{"message":"x","pointsTotal":"ten"}"#).is_err());
    }

    #[test]
    fn test_decode_bytes() {
        let frame = StatusFrame::decode_bytes(br#"{"message":"bin","pointsTotal":3}"#).unwrap();
        assert_eq!(frame.message, "bin");
        assert_eq!(frame.points_total, 3.0);
    }
}
