//! HTTP-origin [`Backend`]: serves TFTP reads by proxying GET requests to
//! a configured origin server, buffering the response stream into blocks.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

use crate::tftp::backend::{Backend, BackendError, FileSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HttpBackend {
    origin: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into(), client: Client::builder().timeout(REQUEST_TIMEOUT).build().expect("reqwest client") }
    }

    fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.origin.trim_end_matches('/'), filename.trim_start_matches('/'))
    }
}

struct HttpFileSource {
    filesize: u64,
    stream: std::pin::Pin<Box<dyn futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    leftover: Vec<u8>,
    finished: bool,
}

#[async_trait]
impl FileSource for HttpFileSource {
    fn filesize(&self) -> u64 {
        self.filesize
    }

    async fn read_block(&mut self, blksize: usize) -> Result<Vec<u8>, BackendError> {
        while self.leftover.len() < blksize && !self.finished {
            match self.stream.next().await {
                Some(Ok(chunk)) => self.leftover.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(BackendError::Http(e)),
                None => {
                    self.finished = true;
                    break;
                }
            }
        }
        let take = blksize.min(self.leftover.len());
        Ok(self.leftover.drain(..take).collect())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn open(&self, filename: &str) -> Result<Box<dyn FileSource>, BackendError> {
        let url = self.url_for(filename);
        let head = self.client.head(&url).send().await?;
        if !head.status().is_success() {
            return Err(BackendError::NotFound(filename.to_string()));
        }
        let filesize = head.content_length().unwrap_or(0);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(BackendError::NotFound(filename.to_string()));
        }
        let stream = Box::pin(response.bytes_stream());
        Ok(Box::new(HttpFileSource { filesize, stream, leftover: Vec::new(), finished: false }))
    }
}
