//! A small JSON HTTP client against the failover control API.

use serde::de::DeserializeOwned;

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, String> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(|e| e.to_string())?;
        resp.json::<T>().await.map_err(|e| e.to_string())
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T, String> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.client.post(&url).send().await.map_err(|e| e.to_string())?;
        resp.json::<T>().await.map_err(|e| e.to_string())
    }
}
