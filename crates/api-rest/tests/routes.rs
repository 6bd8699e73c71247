use api_rest::{cors_layer_from_env_value, router, AppState};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mdr_core::Collections;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    router(
        AppState::new(&Collections::in_memory()),
        cors_layer_from_env_value(None),
    )
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn patient() -> Value {
    json!({
        "resourceType": "Patient",
        "identifier": [{"system": "doc", "value": "123"}],
        "name": [{"use": "official", "family": "Duarte", "given": ["Mario"]}],
        "gender": "male",
        "birthDate": "1986-02-25"
    })
}

async fn create_patient(app: &Router) -> String {
    let (status, body) = send(app, Method::POST, "/patient", Some(patient())).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn create_is_idempotent_per_identifier() {
    let app = app();
    let first = create_patient(&app).await;
    let second = create_patient(&app).await;
    assert_eq!(first, second);
    assert_eq!(first.len(), 32);
}

#[tokio::test]
async fn fetch_by_id_and_by_identifier() {
    let app = app();
    let id = create_patient(&app).await;

    let (status, by_id) = send(&app, Method::GET, &format!("/patient/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_id["id"], id);
    assert_eq!(by_id["resourceType"], "Patient");
    assert_eq!(by_id["identifier"], json!([{"system": "doc", "value": "123"}]));
    assert_eq!(by_id["name"][0]["family"], "Duarte");
    assert!(by_id["createdAt"].is_string());

    let (status, by_identifier) =
        send(&app, Method::GET, "/patient?system=doc&value=123", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_identifier, by_id);
}

#[tokio::test]
async fn unknown_patient_is_404_and_malformed_id_is_500() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::GET,
        "/patient/0123456789abcdef0123456789abcdef",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("not found"));

    let (status, body) = send(&app, Method::GET, "/patient?system=doc&value=nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (status, body) = send(&app, Method::GET, "/patient/not-an-id", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn invalid_patient_is_422() {
    let (status, body) = send(
        &app(),
        Method::POST,
        "/patient",
        Some(json!({"name": [{"family": "Duarte"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("identifier"));
}

#[tokio::test]
async fn hl7_example_patient_is_registered() {
    let example = json!({
        "resourceType": "Patient",
        "id": "example",
        "meta": {"lastUpdated": "2023-03-26T15:21:02.749+11:00"},
        "text": {
            "status": "generated",
            "div": "<div xmlns=\"http://www.w3.org/1999/xhtml\">Peter James Chalmers</div>"
        },
        "extension": [{
            "url": "http://hl7.org/fhir/StructureDefinition/patient-birthPlace",
            "valueAddress": {"city": "Melbourne"}
        }],
        "identifier": [{
            "use": "usual",
            "type": {
                "coding": [{
                    "system": "http://terminology.hl7.org/CodeSystem/v2-0203",
                    "code": "MR"
                }]
            },
            "system": "urn:oid:1.2.36.146.595.217.0.1",
            "value": "12345",
            "period": {"start": "2001-05-06"},
            "assigner": {"display": "Acme Healthcare"}
        }],
        "active": true,
        "name": [
            {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]},
            {"use": "usual", "given": ["Jim"]},
            {
                "use": "maiden",
                "family": "Windsor",
                "given": ["Peter", "James"],
                "period": {"end": "2002"}
            }
        ],
        "telecom": [
            {"use": "home"},
            {"system": "phone", "value": "(03) 5555 6473", "use": "work", "rank": 1},
            {"system": "phone", "value": "(03) 3410 5613", "use": "mobile", "rank": 2},
            {
                "system": "phone",
                "value": "(03) 5555 8834",
                "use": "old",
                "period": {"end": "2014"}
            }
        ],
        "gender": "male",
        "birthDate": "1974-12-25",
        "_birthDate": {
            "extension": [{
                "url": "http://hl7.org/fhir/StructureDefinition/patient-birthTime",
                "valueDateTime": "1974-12-25T14:35:45-05:00"
            }]
        },
        "deceasedBoolean": false,
        "address": [{
            "use": "home",
            "type": "both",
            "text": "534 Erewhon St PeasantVille, Rainbow, Vic  3999",
            "line": ["534 Erewhon St"],
            "city": "PleasantVille",
            "district": "Rainbow",
            "state": "Vic",
            "postalCode": "3999",
            "period": {"start": "1974-12-25"}
        }],
        "contact": [{
            "relationship": [{
                "coding": [{
                    "system": "http://terminology.hl7.org/CodeSystem/v2-0131",
                    "code": "N"
                }]
            }],
            "name": {"family": "du Marché", "given": ["Bénédicte"]},
            "gender": "female",
            "period": {"start": "2012"}
        }],
        "managingOrganization": {"reference": "Organization/1"}
    });

    let app = app();
    let (status, body) = send(&app, Method::POST, "/patient", Some(example.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    assert_ne!(id, "example");
    assert_eq!(id.len(), 32);

    let (status, stored) = send(&app, Method::GET, &format!("/patient/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["id"], id);
    assert_eq!(stored["contact"], example["contact"]);
    assert_eq!(stored["_birthDate"], example["_birthDate"]);
    assert_eq!(stored["name"][2]["period"]["end"], "2002");
    assert_eq!(stored["identifier"][0]["assigner"]["display"], "Acme Healthcare");
}

#[tokio::test]
async fn dispenses_are_listed_most_recent_first() {
    let app = app();
    let id = create_patient(&app).await;
    let uri = format!("/patient/{id}/medications");

    let mut created = Vec::new();
    for at in ["2026-01-01T08:00:00Z", "2026-03-01T08:00:00Z", "2026-02-01T08:00:00Z"] {
        let (status, body) = send(
            &app,
            Method::POST,
            &uri,
            Some(json!({
                "medication": "Amoxicillin 500mg",
                "quantity": 21,
                "daysSupply": 7,
                "dosage": "1 capsule every 8 hours",
                "timestamp": at
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["patientId"], id);
        created.push(body["medicationId"].as_str().unwrap().to_string());
    }

    let (status, listed) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![created[1].as_str(), created[2].as_str(), created[0].as_str()]);
    assert_eq!(listed[0]["subject"]["reference"], format!("Patient/{id}"));
    assert_eq!(listed[0]["status"], "completed");
}

#[tokio::test]
async fn dispense_errors_map_to_404_and_422() {
    let app = app();
    let id = create_patient(&app).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/patient/0123456789abcdef0123456789abcdef/medications",
        Some(json!({"medication": "x", "quantity": 1, "daysSupply": 1, "dosage": "d"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/patient/{id}/medications"),
        Some(json!({"medication": "x", "quantity": 1, "daysSupply": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("dosage"));

    let (status, listed) = send(&app, Method::GET, &format!("/patient/{id}/medications"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));

    let (status, _) = send(
        &app,
        Method::GET,
        "/patient/0123456789abcdef0123456789abcdef/medications",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (status, body) = send(&app(), Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/patient/{id}/medications"].is_object());
}

#[tokio::test]
async fn restricted_cors_echoes_allowed_origin_only() {
    let app = router(
        AppState::new(&Collections::in_memory()),
        cors_layer_from_env_value(Some("https://app.example.org, ,not valid\u{7f}".into())),
    );

    let request = |origin: &str| {
        Request::builder()
            .uri("/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    };

    let allowed = app
        .clone()
        .oneshot(request("https://app.example.org"))
        .await
        .unwrap();
    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example.org"
    );

    let denied = app.oneshot(request("https://evil.example.com")).await.unwrap();
    assert!(denied
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
