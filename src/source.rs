use std::io::Read;

use reqwest::blocking::Client;

use crate::error::FetchError;

/// An opened download: a readable body plus its advertised length.
pub struct Response<R> {
    pub body: R,
    pub content_length: Option<u64>,
}

/// Where the bytes come from. The fetcher only needs to open a URL and read it.
pub trait Source {
    type Body: Read;

    fn open(&self, url: &str) -> Result<Response<Self::Body>, FetchError>;
}

/// Plain blocking HTTP(S) GET. The client is only built once a request is
/// actually made.
pub struct HttpSource {
    client: Option<Client>,
}

impl HttpSource {
    pub fn new() -> Self {
        HttpSource { client: None }
    }

    pub fn with_client(client: Client) -> Self {
        HttpSource {
            client: Some(client),
        }
    }

    fn client(&self) -> Result<Client, FetchError> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            // reqwest's blocking client times out after 30s by default, far
            // too short for a checkpoint of this size.
            None => Ok(Client::builder().timeout(None).build()?),
        }
    }
}

impl Source for HttpSource {
    type Body = reqwest::blocking::Response;

    fn open(&self, url: &str) -> Result<Response<Self::Body>, FetchError> {
        log::debug!("GET {}", url);
        let response = self.client()?.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        log::debug!("response {} with content-length {:?}", status, content_length);
        Ok(Response {
            body: response,
            content_length,
        })
    }
}
