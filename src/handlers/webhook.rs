//! Call-setup webhook.
//!
//! The telephony platform calls `/answer` when a call comes in and expects a
//! control document telling it where to stream the call's audio.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use quick_xml::escape::escape;
use tracing::info;

/// Control document asking the platform to open a bidirectional media stream.
pub fn stream_document(stream_url: &str, content_type: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Stream bidirectional="true" keepCallAlive="true" contentType="{}">{}</Stream></Response>"#,
        escape(content_type),
        escape(stream_url)
    )
}

/// `GET|POST /answer`
pub async fn answer_call(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();
    let stream_url = config.public_stream_url();
    info!(stream_url = %stream_url, "Answering call with media stream");

    HttpResponse::Ok()
        .content_type("application/xml")
        .body(stream_document(&stream_url, &config.telephony.content_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{http::header, test as actix_test, App};

    #[test]
    fn test_stream_document_escapes_values() {
        let doc = stream_document("wss://bridge.example.com/media?a=1&b=2", "audio/x-mulaw;rate=8000");
        assert!(doc.contains(r#"contentType="audio/x-mulaw;rate=8000""#));
        assert!(doc.contains(">wss://bridge.example.com/media?a=1&amp;b=2</Stream>"));
    }

    #[actix_web::test]
    async fn test_answer_points_at_public_stream() {
        let mut config = AppConfig::default();
        config.telephony.public_ws_url = "wss://bridge.example.com".to_string();
        let state = AppState::new(config);

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/answer", web::post().to(answer_call)),
        )
        .await;

        let resp = actix_test::call_service(&app, actix_test::TestRequest::post().uri("/answer").to_request()).await;
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "application/xml");

        let body = actix_test::read_body(resp).await;
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains(r#"<Stream bidirectional="true" keepCallAlive="true""#));
        assert!(body.contains(">wss://bridge.example.com/media</Stream>"));
    }
}
