use std::borrow::Cow;
use std::io::Cursor;
use tokio_tungstenite::tungstenite::Message as Frame;

/// Type tag of a data message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Binary,
}

/// A complete data message received from or sent to a peer
///
/// Control frames (ping, pong, close) never surface as a `Message`;
/// the session driver answers them itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    /// Build a text message
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    /// Build a binary message
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::Binary(_) => MessageKind::Binary,
        }
    }

    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Raw payload bytes regardless of the type tag
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(s) => s.as_bytes(),
            Message::Binary(b) => b,
        }
    }

    /// Payload as text, replacing invalid UTF-8 in binary payloads
    pub fn string(&self) -> Cow<'_, str> {
        match self {
            Message::Text(s) => Cow::Borrowed(s),
            Message::Binary(b) => String::from_utf8_lossy(b),
        }
    }

    /// Streamed access to the payload
    ///
    /// ```ignore
    /// let mut body = String::new();
    /// message.reader().read_to_string(&mut body)?;
    /// ```
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.as_bytes())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Message::Text(s) => s.into_bytes(),
            Message::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if message is text
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Check if message is binary
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Convert a received frame, dropping control frames
    pub(crate) fn from_frame(frame: Frame) -> Option<Self> {
        match frame {
            Frame::Text(text) => Some(Message::Text(text)),
            Frame::Binary(data) => Some(Message::Binary(data)),
            Frame::Ping(_) | Frame::Pong(_) | Frame::Close(_) | Frame::Frame(_) => None,
        }
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(data) => Frame::Binary(data),
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}

impl From<&[u8]> for Message {
    fn from(data: &[u8]) -> Self {
        Message::Binary(data.to_vec())
    }
}
