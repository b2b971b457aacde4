/*!
 * Tests for provider adapters against mocked HTTP servers
 */

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use subrelay::errors::ProviderError;
use subrelay::providers::{HttpTransport, TranslationProvider};
use subrelay::providers::anthropic::Anthropic;
use subrelay::providers::custom::CustomEndpoint;
use subrelay::providers::deepl::DeepL;
use subrelay::providers::libretranslate::LibreTranslate;
use subrelay::providers::local_ai::LocalAI;
use subrelay::providers::openai::OpenAI;
use subrelay::settings::{MemorySettings, keys};

use crate::common::{fast_policy, transport};

fn settings(pairs: &[(&str, &str)]) -> Arc<MemorySettings> {
    Arc::new(MemorySettings::with(pairs))
}

#[tokio::test]
async fn test_customEndpoint_shouldPostTextAndReadTranslatedText() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_json(json!({"text": "Hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translatedText": "Bonjour"})))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = format!("{}/translate", server.uri());
    let provider = CustomEndpoint::new(settings(&[(keys::CUSTOM_ENDPOINT, &endpoint)]), transport(1));

    let text = provider.translate("Hello", "en", "fr", &CancellationToken::new()).await.unwrap();
    assert_eq!(text, "Bonjour");
}

#[tokio::test]
async fn test_httpTransport_shouldApplyConfiguredTimeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"translatedText": "Bonjour"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(Duration::from_millis(200), fast_policy(1)).unwrap();
    let endpoint = format!("{}/translate", server.uri());
    let provider = CustomEndpoint::new(settings(&[(keys::CUSTOM_ENDPOINT, &endpoint)]), transport);

    let started = std::time::Instant::now();
    let error = provider
        .translate("Hello", "en", "fr", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::Transient(_)), "{:?}", error);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_customEndpoint_withEmptyTranslation_shouldBeInvalidResponse() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translatedText": ""})))
        .mount(&server)
        .await;

    let provider = CustomEndpoint::new(settings(&[(keys::CUSTOM_ENDPOINT, &server.uri())]), transport(1));

    let error = provider.translate("Hello", "en", "fr", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(error, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_customEndpoint_withoutSetting_shouldBeConfigurationErrorAndRetryInitLater() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translatedText": "Hallo"})))
        .mount(&server)
        .await;

    let settings = settings(&[]);
    let provider = CustomEndpoint::new(settings.clone(), transport(1));
    let cancel = CancellationToken::new();

    let error = provider.translate("Hello", "en", "de", &cancel).await.unwrap_err();
    assert!(matches!(error, ProviderError::Configuration(_)));

    // A failed initialization leaves the adapter uninitialized
    settings.set(keys::CUSTOM_ENDPOINT, &server.uri());
    assert_eq!(provider.translate("Hello", "en", "de", &cancel).await.unwrap(), "Hallo");
}

#[tokio::test]
async fn test_customEndpoint_withInvalidUrl_shouldBeConfigurationError() {
    let provider = CustomEndpoint::new(settings(&[(keys::CUSTOM_ENDPOINT, "localhost without scheme")]), transport(1));
    let error = provider.translate("Hello", "en", "fr", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(error, ProviderError::Configuration(_)));
}

#[tokio::test]
async fn test_libreTranslate_shouldSendLanguagesAndApiKey() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_json(json!({
            "q": "Hello",
            "source": "en",
            "target": "fr",
            "format": "text",
            "api_key": "secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translatedText": "Bonjour"})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = LibreTranslate::new(
        settings(&[
            (keys::LIBRETRANSLATE_URL, &format!("{}/", server.uri())),
            (keys::LIBRETRANSLATE_API_KEY, "secret"),
        ]),
        transport(1),
    );

    let text = provider.translate("Hello", "eng", "fra", &CancellationToken::new()).await.unwrap();
    assert_eq!(text, "Bonjour");
}

#[tokio::test]
async fn test_libreTranslate_withServerErrors_shouldRetryThenSucceed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translatedText": "Hola"})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = LibreTranslate::new(settings(&[(keys::LIBRETRANSLATE_URL, &server.uri())]), transport(5));

    let text = provider.translate("Hello", "en", "es", &CancellationToken::new()).await.unwrap();
    assert_eq!(text, "Hola");
}

#[tokio::test]
async fn test_libreTranslate_withNotFound_shouldReturnApiErrorWithoutRetry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = LibreTranslate::new(settings(&[(keys::LIBRETRANSLATE_URL, &server.uri())]), transport(5));

    let error = provider.translate("Hello", "en", "es", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        error,
        ProviderError::ApiError { status_code: 404, ref message } if message == "no such route"
    ));
}

#[tokio::test]
async fn test_libreTranslate_withPersistentRateLimit_shouldReturnTransientApiError() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let provider = LibreTranslate::new(settings(&[(keys::LIBRETRANSLATE_URL, &server.uri())]), transport(3));

    let error = provider.translate("Hello", "en", "es", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(error, ProviderError::ApiError { status_code: 429, .. }));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_libreTranslate_cancelledWhileInFlight_shouldReturnCancelled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"translatedText": "late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let provider = LibreTranslate::new(settings(&[(keys::LIBRETRANSLATE_URL, &server.uri())]), transport(1));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let error = provider.translate("Hello", "en", "es", &cancel).await.unwrap_err();
    assert!(matches!(error, ProviderError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_deepl_shouldUseAuthHeaderAndUppercaseCodes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/translate"))
        .and(header("Authorization", "DeepL-Auth-Key key:fx"))
        .and(body_json(json!({"text": ["Hello"], "source_lang": "EN", "target_lang": "DE"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"translations": [{"text": "Hallo"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = DeepL::new(settings(&[(keys::DEEPL_API_KEY, "key:fx")]), transport(1))
        .with_base_url(server.uri());

    let text = provider.translate("Hello", "en", "de", &CancellationToken::new()).await.unwrap();
    assert_eq!(text, "Hallo");
}

#[tokio::test]
async fn test_deepl_withNoTranslations_shouldBeInvalidResponse() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translations": []})))
        .mount(&server)
        .await;

    let provider = DeepL::new(settings(&[(keys::DEEPL_API_KEY, "key")]), transport(1))
        .with_base_url(server.uri());

    let error = provider.translate("Hello", "en", "de", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(error, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_openai_shouldSendModelAndRenderedPrompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "Translate English to French"},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": " Bonjour \n"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAI::new(
        settings(&[
            (keys::OPENAI_API_KEY, "sk-test"),
            (keys::OPENAI_MODEL, "gpt-4o-mini"),
            (keys::AI_PROMPT, "Translate {sourceLanguage} to {targetLanguage}"),
        ]),
        transport(1),
    )
    .with_base_url(server.uri());

    let text = provider.translate("Hello", "en", "fr", &CancellationToken::new()).await.unwrap();
    assert_eq!(text, "Bonjour");
}

#[tokio::test]
async fn test_openai_withoutModel_shouldBeConfigurationError() {
    let provider = OpenAI::new(settings(&[(keys::OPENAI_API_KEY, "sk-test")]), transport(1));
    let error = provider.translate("Hello", "en", "fr", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(error, ProviderError::Configuration(_)));
}

#[tokio::test]
async fn test_localAi_shouldPostToConfiguredEndpointWithoutAuth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "mistral"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Ciao"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = format!("{}/v1/chat/completions", server.uri());
    let provider = LocalAI::new(
        settings(&[(keys::LOCAL_AI_ENDPOINT, &endpoint), (keys::LOCAL_AI_MODEL, "mistral")]),
        transport(1),
    );

    let text = provider.translate("Hello", "en", "it", &CancellationToken::new()).await.unwrap();
    assert_eq!(text, "Ciao");
}

#[tokio::test]
async fn test_anthropic_shouldSendHeadersAndJoinTextBlocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ant-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Guten Tag"}],
            "usage": {"input_tokens": 3, "output_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = Anthropic::new(
        settings(&[(keys::ANTHROPIC_API_KEY, "ant-key"), (keys::ANTHROPIC_MODEL, "claude-test")]),
        transport(1),
    )
    .with_base_url(server.uri());

    let text = provider.translate("Hello", "en", "de", &CancellationToken::new()).await.unwrap();
    assert_eq!(text, "Guten Tag");
}
