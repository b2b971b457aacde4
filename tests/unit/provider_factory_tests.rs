/*!
 * Tests for provider selection backed by persisted settings
 */

use std::sync::Arc;

use subrelay::database::Repository;
use subrelay::errors::ProviderError;
use subrelay::providers::ProviderKind;
use subrelay::providers::factory::ProviderFactory;
use subrelay::settings::{SqliteSettings, keys};

use crate::common::transport;

fn sqlite_factory() -> (SqliteSettings, ProviderFactory) {
    let settings = SqliteSettings::new(Repository::new_in_memory().unwrap());
    let factory = ProviderFactory::new(Arc::new(settings.clone()), transport(1));
    (settings, factory)
}

#[tokio::test]
async fn test_resolveProvider_shouldFollowPersistedServiceType() {
    let (settings, factory) = sqlite_factory();
    assert_eq!(factory.resolve_provider().await.unwrap().name(), "libretranslate");

    settings.set_setting(keys::SERVICE_TYPE, "deepl").await.unwrap();
    assert_eq!(factory.resolve_provider().await.unwrap().name(), "deepl");

    settings.set_setting(keys::SERVICE_TYPE, " OpenAI ").await.unwrap();
    assert_eq!(factory.resolve_provider().await.unwrap().name(), "openai");
}

#[tokio::test]
async fn test_resolveProvider_withUnknownServiceType_shouldBeUnsupported() {
    let (settings, factory) = sqlite_factory();
    settings.set_setting(keys::SERVICE_TYPE, "babelfish").await.unwrap();

    let error = factory.resolve_provider().await.unwrap_err();
    assert!(matches!(error, ProviderError::Unsupported(name) if name == "babelfish"));
}

#[test]
fn test_createProvider_shouldBuildEveryKind() {
    let (_, factory) = sqlite_factory();
    for kind in ProviderKind::ALL {
        let provider = factory.create_provider(kind.key()).unwrap();
        assert_eq!(provider.name(), kind.key());
    }
}

#[tokio::test]
async fn test_resolveProvider_shouldReuseInstanceAcrossCalls() {
    let (settings, factory) = sqlite_factory();
    settings.set_setting(keys::SERVICE_TYPE, "localai").await.unwrap();

    let first = factory.resolve_provider().await.unwrap();
    let second = factory.create_provider("localai").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
