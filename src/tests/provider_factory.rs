// Provider selection end to end: configuration + environment in, working provider out.

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{TimeDelta, Utc};
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    use crate::config::auth::{AuthConfig, CLIENT_ID_KEY, CLIENT_SECRET_KEY};
    use crate::config::settings::ProviderOverride;
    use crate::config::{AgentEnvironment, BrokerConfig};
    use crate::identity::{identity_request_name, AzureClusterIdentityRequest, IdentityRequestStore};
    use crate::providers::factory::ProviderKind;
    use crate::providers::{ProviderFactory, TokenProvider};
    use crate::tests::common::{build_reqwest_client, InMemoryIdentityStore, TEST_RSA_KEY};
    use crate::token::access_token::{AUTHORIZATION_HEADER, SHARED_KEY_SCHEME};
    use crate::utils::constants::{CONNECTED_CLUSTER_AUDIENCE, PRIVATE_KEY_DATA_KEY};

    const NAMESPACE: &str = "azure-arc";

    fn connected_env() -> AgentEnvironment {
        AgentEnvironment {
            tenant_id: "tenant-id".into(),
            subscription_id: "sub".into(),
            resource_group: "rg".into(),
            resource_name: "cluster".into(),
            cluster_type: "connectedClusters".into(),
            private_key_secret_name: "onboarding-key".into(),
            private_key_secret_namespace: NAMESPACE.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn connected_cluster_signs_with_onboarding_key() {
        let store = InMemoryIdentityStore::new();
        store.insert_secret(NAMESPACE, "onboarding-key", PRIVATE_KEY_DATA_KEY, TEST_RSA_KEY);

        let factory = ProviderFactory::new(&BrokerConfig::default(), connected_env(), build_reqwest_client())
            .with_identity_store(store.clone(), NAMESPACE);
        assert_eq!(factory.kind().unwrap(), ProviderKind::SignedMessage);

        let mut provider = factory.build().await.expect("provider");
        assert_eq!(provider.name(), "signed_message");
        let token = provider.get_token().await.unwrap();
        assert_eq!(token.header_name(), AUTHORIZATION_HEADER);
        assert_eq!(token.auth_scheme(), SHARED_KEY_SCHEME);
        // raw cluster type, case preserved
        assert!(token.token().starts_with("sub/rg/connectedClusters/cluster:"));
    }

    #[tokio::test]
    async fn cluster_identity_needs_identity_store() {
        let env = AgentEnvironment { managed_identity_auth: true, ..connected_env() };
        let factory = ProviderFactory::new(&BrokerConfig::default(), env, build_reqwest_client());
        assert!(factory.kind().unwrap().needs_identity_store());
        let err = factory.build().await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[tokio::test]
    async fn cluster_identity_reuses_answered_request() {
        let store = InMemoryIdentityStore::new();
        let request = AzureClusterIdentityRequest::for_audience(NAMESPACE, CONNECTED_CLUSTER_AUDIENCE, "");
        store.insert_answered(request, "cluster-token", Utc::now() + TimeDelta::hours(3));

        let env = AgentEnvironment { managed_identity_auth: true, ..connected_env() };
        let factory = ProviderFactory::new(&BrokerConfig::default(), env, build_reqwest_client())
            .with_identity_store(store.clone(), NAMESPACE);
        assert_eq!(factory.audience(), CONNECTED_CLUSTER_AUDIENCE);

        let mut provider = factory.build().await.unwrap();
        assert_eq!(provider.name(), "cluster_identity");
        assert_eq!(provider.get_token().await.unwrap().token(), "cluster-token");
        assert_eq!(store.creates.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn extension_provider_addresses_its_own_request() {
        let store = InMemoryIdentityStore::new();
        let request = AzureClusterIdentityRequest::for_audience(NAMESPACE, "api://extension", "my-extension");
        store.insert_answered(request, "extension-token", Utc::now() + TimeDelta::hours(3));

        let factory = ProviderFactory::new(&BrokerConfig::default(), connected_env(), build_reqwest_client())
            .with_identity_store(store.clone(), NAMESPACE);
        let mut provider = factory.extension_provider("api://extension", "my-extension").unwrap();
        assert_eq!(provider.get_token().await.unwrap().token(), "extension-token");

        match &provider {
            TokenProvider::ClusterIdentity(cluster) => {
                assert_eq!(cluster.resource_id(), "my-extension");
                let exchange = cluster.exchange().expect("exchange started");
                assert_eq!(exchange.request_name(), identity_request_name("api://extension", "my-extension"));
            }
            other => panic!("unexpected provider {}", other.name()),
        }
        let stored = store
            .get(NAMESPACE, &identity_request_name("api://extension", "my-extension"))
            .await
            .unwrap();
        assert!(stored.is_some());
        assert_eq!(store.request_names(), vec![identity_request_name("api://extension", "my-extension")]);
    }

    #[tokio::test]
    async fn managed_cluster_reads_azure_json() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/aks-tenant/oauth2/token");
            then.status(200).json_body(json!({
                "access_token": "aks-token",
                "expires_in": "3599",
                "expires_on": "1900000000",
                "token_type": "Bearer"
            }));
        });

        let azure_json = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            azure_json.path(),
            json!({
                "tenantId": "aks-tenant",
                "aadClientId": "aks-client",
                "aadClientSecret": "aks-secret",
                "useManagedIdentityExtension": false
            })
            .to_string(),
        )
        .unwrap();

        let mut config = BrokerConfig::default();
        config.provider.authority_host = Some(server.base_url());
        let env = AgentEnvironment {
            cluster_type: "managedClusters".into(),
            aks_credential_location: azure_json.path().display().to_string(),
            ..Default::default()
        };

        let mut provider = ProviderFactory::new(&config, env, build_reqwest_client()).build().await.unwrap();
        assert_eq!(provider.name(), "aks_credential");
        assert_eq!(provider.get_token().await.unwrap().token(), "aks-token");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn auth_section_overrides_cluster_type() {
        let mut config = BrokerConfig::default();
        config.auth = Some(AuthConfig {
            service_principal_credentials: HashMap::from([
                (CLIENT_ID_KEY.to_owned(), "sp-client".to_owned()),
                (CLIENT_SECRET_KEY.to_owned(), "sp-secret".to_owned()),
            ]),
            ..Default::default()
        });
        let factory = ProviderFactory::new(&config, connected_env(), build_reqwest_client());
        assert_eq!(factory.kind().unwrap(), ProviderKind::ServicePrincipal);
        assert_eq!(factory.build().await.unwrap().name(), "service_principal");

        config.auth = Some(AuthConfig { use_pod_identity: true, ..Default::default() });
        let factory = ProviderFactory::new(&config, connected_env(), build_reqwest_client());
        assert_eq!(factory.build().await.unwrap().name(), "pod_identity");
    }

    #[tokio::test]
    async fn override_selects_certificate_even_with_auth() {
        let mut config = BrokerConfig::default();
        config.provider.override_value = ProviderOverride::BearerTokenCertificate;
        config.auth = Some(AuthConfig { use_pod_identity: true, ..Default::default() });
        let factory = ProviderFactory::new(&config, connected_env(), build_reqwest_client());
        assert_eq!(factory.kind().unwrap(), ProviderKind::Certificate);
        // no provider.certificate section
        assert_eq!(factory.build().await.unwrap_err().kind(), "config");
    }

    #[tokio::test]
    async fn missing_onboarding_secret_names_is_config_error() {
        let store: Arc<InMemoryIdentityStore> = InMemoryIdentityStore::new();
        let env = AgentEnvironment { private_key_secret_name: String::new(), ..connected_env() };
        let factory =
            ProviderFactory::new(&BrokerConfig::default(), env, build_reqwest_client()).with_identity_store(store, NAMESPACE);
        assert_eq!(factory.build().await.unwrap_err().kind(), "config");
    }
}
