use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use shared::domain::FilePath;
use shared::protocol::{
    DeriveIdentifierRequest, DerivedIdentifier, RenameFileRequest, RenameFileResponse,
    SaveEntryRequest, SaveEntryResponse, Settings, SettingsPatch,
};
use tokio::net::TcpListener;

use super::*;

async fn spawn_backend(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn derive_identifier_round_trips() {
    let app = Router::new().route(
        "/api/cite-key",
        post(|Json(request): Json<DeriveIdentifierRequest>| async move {
            let key = format!("{}_{}", request.title.to_lowercase(), request.date);
            Json(DerivedIdentifier {
                filename: format!("{key}.bib"),
                cite_key: key,
            })
        }),
    );
    let gateway = HttpBackendGateway::new(spawn_backend(app).await);

    let derived = gateway
        .derive_identifier(DeriveIdentifierRequest {
            title: "Title".to_string(),
            author: String::new(),
            date: "2020".to_string(),
        })
        .await
        .expect("derive");
    assert_eq!(derived.cite_key, "title_2020");
    assert_eq!(derived.filename, "title_2020.bib");
}

#[tokio::test]
async fn save_entry_parses_companion_fields() {
    let app = Router::new().route(
        "/api/save",
        post(|Json(request): Json<SaveEntryRequest>| async move {
            Json(SaveEntryResponse {
                ok: true,
                filename: format!("{}.bib", request.filename),
                companion_updated: true,
                companion_warning: Some("section marker not found".to_string()),
                error: None,
            })
        }),
    );
    let gateway = HttpBackendGateway::new(spawn_backend(app).await);

    let response = gateway
        .save_entry(SaveEntryRequest {
            entry_type: "book".into(),
            fields: Default::default(),
            cite_key: "smith_2020".to_string(),
            filename: "smith_2020".to_string(),
            section_id: None,
        })
        .await
        .expect("save");
    assert!(response.ok);
    assert_eq!(response.filename, "smith_2020.bib");
    assert!(response.companion_updated);
    assert_eq!(
        response.companion_warning.as_deref(),
        Some("section marker not found")
    );
}

#[tokio::test]
async fn rename_file_round_trips() {
    let app = Router::new().route(
        "/api/bib/rename",
        post(|Json(request): Json<RenameFileRequest>| async move {
            Json(RenameFileResponse {
                ok: true,
                new_name: format!("{}.bib", request.new_name),
                new_path: Some(FilePath::new(format!("/bib/{}.bib", request.new_name))),
                error: None,
            })
        }),
    );
    let gateway = HttpBackendGateway::new(spawn_backend(app).await);

    let response = gateway
        .rename_file(RenameFileRequest {
            path: FilePath::from("/bib/old.bib"),
            new_name: "fresh".to_string(),
        })
        .await
        .expect("rename");
    assert!(response.ok);
    assert_eq!(response.new_name, "fresh.bib");
    assert_eq!(response.new_path, Some(FilePath::from("/bib/fresh.bib")));
}

#[tokio::test]
async fn write_settings_returns_the_full_bag() {
    let app = Router::new().route(
        "/api/settings",
        get(|| async { Json(Settings::default()) }).post(
            |Json(patch): Json<SettingsPatch>| async move {
                let mut settings = Settings::default();
                if let Some(v) = patch.last_entry_type {
                    settings.last_entry_type = v;
                }
                Json(settings)
            },
        ),
    );
    let gateway = HttpBackendGateway::new(spawn_backend(app).await);

    let settings = gateway
        .write_settings(SettingsPatch::last_entry_type(&"book".into()))
        .await
        .expect("write settings");
    assert_eq!(settings.last_entry_type, "book");
    assert!(settings.auto_update_preview);
}

#[tokio::test]
async fn server_errors_are_propagated() {
    let app = Router::new().route(
        "/api/library",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let gateway = HttpBackendGateway::new(spawn_backend(app).await);

    let err = gateway.list_library().await.expect_err("must fail");
    assert!(err.to_string().contains("500"), "unexpected error: {err:#}");
}

#[tokio::test]
async fn missing_gateway_fails_every_call() {
    let gateway = MissingBackendGateway;
    let err = gateway.list_library().await.expect_err("must fail");
    assert!(err.to_string().contains("unavailable"));
}
