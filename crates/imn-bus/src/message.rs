use std::collections::HashMap;

/// Message headers: a flat string map carried alongside the payload.
pub type HeaderMap = HashMap<String, String>;

/// One bus message.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub headers: HeaderMap,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            headers: HeaderMap::new(),
            payload,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}
