use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::analytics;
use crate::dataset;
use crate::models::{
    Dataset, DatasetSummary, RawBundle, TeamDetails, TeamRef, UserDetails, UserRef,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub request_id: String,
}

/// Stateless router over a process-wide dataset snapshot. Every request is
/// answered with a `_SUCCESS` or `_ERROR` envelope echoing the caller's
/// correlation id; lookups that miss answer `_SUCCESS` with a null payload.
#[derive(Debug)]
pub struct Dispatcher {
    dataset: Dataset,
    today: NaiveDate,
}

impl Dispatcher {
    pub fn new(today: NaiveDate) -> Self {
        Dispatcher {
            dataset: Dataset::default(),
            today,
        }
    }

    pub fn handle(&mut self, request: RequestEnvelope) -> ResponseEnvelope {
        match self.execute(&request.kind, request.payload) {
            Ok(payload) => ResponseEnvelope {
                kind: format!("{}_SUCCESS", request.kind),
                payload,
                request_id: request.request_id,
            },
            Err(message) => ResponseEnvelope {
                kind: format!("{}_ERROR", request.kind),
                payload: Value::String(message),
                request_id: request.request_id,
            },
        }
    }

    fn execute(&mut self, kind: &str, payload: Value) -> Result<Value, String> {
        match kind {
            "INIT_DATA" => {
                let raw: RawBundle = serde_json::from_value(payload)
                    .map_err(|e| format!("malformed dataset bundle: {e}"))?;
                // The new snapshot is built completely before it replaces the
                // old one, so a failed load leaves the previous state intact.
                self.dataset = dataset::preprocess(raw, self.today);
                to_value(self.summary())
            }
            "GET_INITIAL_DATA" => to_value(self.summary()),
            "GET_INDIVIDUAL_ANALYTICS" => {
                let handle = expect_string(payload)?;
                to_value(analytics::individual_analytics(&self.dataset, &handle))
            }
            "GET_TEAM_ANALYTICS" => {
                let name = expect_string(payload)?;
                to_value(analytics::team_analytics(&self.dataset, &name))
            }
            "GET_UNIVERSITY_ANALYTICS" => {
                let name = expect_string(payload)?;
                to_value(analytics::university_analytics(&self.dataset, &name))
            }
            "GET_COMPETITION_ANALYTICS" => {
                let name = expect_string(payload)?;
                to_value(analytics::competition_analytics(&self.dataset, &name))
            }
            "GET_GLOBAL_ANALYTICS" => to_value(analytics::global_analytics(&self.dataset)),
            "GET_USER_DETAILS" => {
                let handle = expect_string(payload)?;
                to_value(self.user_details(&handle))
            }
            "GET_TEAM_DETAILS" => {
                let id = expect_string(payload)?;
                to_value(self.team_details(&id))
            }
            other => Err(format!("unknown request type: {other}")),
        }
    }

    fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            users: self
                .dataset
                .users
                .iter()
                .map(|u| UserRef {
                    handle: u.handle.clone(),
                    full_name: u.full_name.clone(),
                })
                .collect(),
            teams: self
                .dataset
                .teams
                .iter()
                .map(|t| TeamRef {
                    id: t.id.clone(),
                    name: t.name.clone(),
                })
                .collect(),
            universities: self.dataset.universities.clone(),
            competitions: self.dataset.competitions.keys().cloned().collect(),
        }
    }

    fn user_details(&self, handle: &str) -> Option<UserDetails> {
        let user = self.dataset.find_user(handle)?;
        let teams = self
            .dataset
            .teams
            .iter()
            .filter(|t| t.members.iter().any(|m| m.eq_ignore_ascii_case(handle)))
            .cloned()
            .collect();
        Some(UserDetails {
            user: user.clone(),
            teams,
        })
    }

    fn team_details(&self, id: &str) -> Option<TeamDetails> {
        let team = self.dataset.find_team_by_id(id)?;
        let mut seen = std::collections::HashSet::new();
        let mut placements = Vec::new();
        for user in &self.dataset.users {
            for placement in &user.placements {
                if placement.team_id.as_deref() == Some(id) && seen.insert(placement.name.clone()) {
                    placements.push(placement.clone());
                }
            }
        }
        // Newest competitions first; undated results sink to the end.
        placements.sort_by(|a, b| b.date.cmp(&a.date));
        Some(TeamDetails {
            team: team.clone(),
            placements,
        })
    }

    /// Channel-based service loop: requests are handled one at a time in
    /// arrival order, which serializes loads against queries.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<RequestEnvelope>,
        responses: mpsc::Sender<ResponseEnvelope>,
    ) {
        while let Some(request) = requests.recv().await {
            if responses.send(self.handle(request)).await.is_err() {
                break;
            }
        }
    }

    pub fn spawn(self) -> (mpsc::Sender<RequestEnvelope>, mpsc::Receiver<ResponseEnvelope>) {
        let (request_tx, request_rx) = mpsc::channel(32);
        let (response_tx, response_rx) = mpsc::channel(32);
        tokio::spawn(self.run(request_rx, response_tx));
        (request_tx, response_rx)
    }
}

fn expect_string(payload: Value) -> Result<String, String> {
    match payload {
        Value::String(s) => Ok(s),
        other => Err(format!("expected a string payload, got: {other}")),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 30).unwrap()
    }

    fn request(kind: &str, payload: Value, id: &str) -> RequestEnvelope {
        RequestEnvelope {
            kind: kind.to_string(),
            payload,
            request_id: id.to_string(),
        }
    }

    fn bundle() -> Value {
        json!({
            "users": [
                {
                    "handle": "alice",
                    "fullName": "Alice A",
                    "university": "KTH",
                    "placements": [
                        {"name": "Spring Open 2024", "rank": 2, "total": 40, "teamId": "t1"}
                    ]
                }
            ],
            "teams": [
                {
                    "id": "t1",
                    "name": "Kodkrigarna",
                    "university": "KTH",
                    "members": ["alice"],
                    "createdAt": "2023-01-01",
                    "isActive": true
                }
            ],
            "competitions": {"Spring Open 2024": {"date": "2024-04-20"}},
            "universities": ["KTH"]
        })
    }

    #[test]
    fn load_then_query_round_trip() {
        let mut dispatcher = Dispatcher::new(today());

        let loaded = dispatcher.handle(request("INIT_DATA", bundle(), "req-1"));
        assert_eq!(loaded.kind, "INIT_DATA_SUCCESS");
        assert_eq!(loaded.request_id, "req-1");
        assert_eq!(loaded.payload["users"][0]["handle"], "alice");
        assert_eq!(loaded.payload["competitions"][0], "Spring Open 2024");

        let response =
            dispatcher.handle(request("GET_INDIVIDUAL_ANALYTICS", json!("ALICE"), "req-2"));
        assert_eq!(response.kind, "GET_INDIVIDUAL_ANALYTICS_SUCCESS");
        assert_eq!(response.request_id, "req-2");
        assert_eq!(response.payload["totalCompetitions"], 1);
        assert_eq!(response.payload["teamCompetitions"], 1);
    }

    #[test]
    fn unknown_type_is_an_error_with_the_same_id() {
        let mut dispatcher = Dispatcher::new(today());
        let response = dispatcher.handle(request("MAKE_COFFEE", Value::Null, "req-9"));
        assert_eq!(response.kind, "MAKE_COFFEE_ERROR");
        assert_eq!(response.request_id, "req-9");
        assert!(response
            .payload
            .as_str()
            .unwrap()
            .contains("unknown request type"));
    }

    #[test]
    fn malformed_payload_is_an_error_not_a_crash() {
        let mut dispatcher = Dispatcher::new(today());
        dispatcher.handle(request("INIT_DATA", bundle(), "req-1"));

        let response = dispatcher.handle(request("INIT_DATA", json!({"users": 7}), "req-2"));
        assert_eq!(response.kind, "INIT_DATA_ERROR");
        // The failed load left the previous snapshot in place.
        let details = dispatcher.handle(request("GET_USER_DETAILS", json!("alice"), "req-3"));
        assert_eq!(details.payload["user"]["handle"], "alice");

        let response =
            dispatcher.handle(request("GET_TEAM_ANALYTICS", json!({"name": "x"}), "req-4"));
        assert_eq!(response.kind, "GET_TEAM_ANALYTICS_ERROR");
    }

    #[test]
    fn missing_lookups_answer_success_with_null() {
        let mut dispatcher = Dispatcher::new(today());
        dispatcher.handle(request("INIT_DATA", bundle(), "req-1"));
        for (kind, payload) in [
            ("GET_INDIVIDUAL_ANALYTICS", json!("nobody")),
            ("GET_TEAM_ANALYTICS", json!("No Such Team")),
            ("GET_USER_DETAILS", json!("nobody")),
            ("GET_TEAM_DETAILS", json!("t99")),
        ] {
            let response = dispatcher.handle(request(kind, payload, "req-x"));
            assert_eq!(response.kind, format!("{kind}_SUCCESS"));
            assert_eq!(response.payload, Value::Null);
        }
    }

    #[test]
    fn queries_before_any_load_see_an_empty_dataset() {
        let mut dispatcher = Dispatcher::new(today());
        let response = dispatcher.handle(request("GET_GLOBAL_ANALYTICS", Value::Null, "req-1"));
        assert_eq!(response.kind, "GET_GLOBAL_ANALYTICS_SUCCESS");
        assert_eq!(response.payload["topUniversities"], json!([]));

        let summary = dispatcher.handle(request("GET_INITIAL_DATA", Value::Null, "req-2"));
        assert_eq!(summary.payload["users"], json!([]));
    }

    #[test]
    fn team_details_sort_newest_first() {
        let mut dispatcher = Dispatcher::new(today());
        let mut data = bundle();
        data["competitions"]["Winter Open 2023"] = json!({"date": "2023-12-01"});
        data["users"][0]["placements"]
            .as_array_mut()
            .unwrap()
            .push(json!({"name": "Winter Open 2023", "rank": 10, "total": 40, "teamId": "t1"}));
        dispatcher.handle(request("INIT_DATA", data, "req-1"));

        let response = dispatcher.handle(request("GET_TEAM_DETAILS", json!("t1"), "req-2"));
        let names: Vec<_> = response.payload["placements"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Spring Open 2024", "Winter Open 2023"]);
    }

    #[tokio::test]
    async fn channel_boundary_echoes_correlation_ids() {
        let dispatcher = Dispatcher::new(today());
        let (requests, mut responses) = dispatcher.spawn();

        requests
            .send(request("INIT_DATA", bundle(), "load-1"))
            .await
            .unwrap();
        requests
            .send(request("GET_GLOBAL_ANALYTICS", Value::Null, "query-1"))
            .await
            .unwrap();

        let first = responses.recv().await.unwrap();
        assert_eq!(first.request_id, "load-1");
        let second = responses.recv().await.unwrap();
        assert_eq!(second.request_id, "query-1");
        assert_eq!(second.kind, "GET_GLOBAL_ANALYTICS_SUCCESS");
        assert_eq!(second.payload["userDistribution"]["labels"][0], "KTH");
    }
}
