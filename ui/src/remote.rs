use serde::Deserialize;

/// Thin client for a running chat service.
#[derive(Debug, Clone)]
pub(crate) struct RemoteChat {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: Option<String>,
}

impl RemoteChat {
    pub(crate) fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Always yields display text; transport problems are described rather than raised.
    pub(crate) async fn ask(&self, question: &str) -> String {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("question", question)])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) if err.is_connect() => {
                return format!(
                    "Error: Could not connect to the chat service at {}. Is the server running?",
                    self.endpoint
                );
            }
            Err(err) => return format!("An unexpected error occurred: {err}"),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => interpret(status, &body),
            Err(err) => format!("An unexpected error occurred: {err}"),
        }
    }
}

fn interpret(status: u16, body: &str) -> String {
    if status != 200 {
        return format!("Error: API returned status code {status}. Response: {body}");
    }

    match serde_json::from_str::<ChatResponse>(body) {
        Ok(ChatResponse {
            response: Some(answer),
        }) => answer,
        _ => "Error: Response field missing from API.".to_string(),
    }
}
