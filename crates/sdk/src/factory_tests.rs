// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::client::{ClientError, TokenSource};
use crate::mux::ClientMultiplexer;

struct StaticTokens;

#[async_trait]
impl TokenSource for StaticTokens {
    async fn access_token(&self, _resource: &str) -> Result<String, ClientError> {
        Ok("token".to_string())
    }
}

const URL: &str = "https://org.example.test";

fn factory() -> ClientFactory {
    ClientFactory::new("c1".into(), Arc::new(StaticTokens), Arc::new(ClientMultiplexer::new(2)))
}

#[test]
fn factory_remembers_its_bound_connection() {
    assert_eq!(factory().bound_connection().as_str(), "c1");
}

#[test]
fn service_client_registers_on_first_use() {
    let factory = factory();
    let client = factory.service_client(URL).unwrap();
    assert_eq!(client.base_url(), URL);

    // Environment is now registered; a second call reuses it.
    let again = factory.service_client(URL).unwrap();
    assert_eq!(again.base_url(), URL);
}

#[tokio::test]
async fn lease_goes_through_the_gate() {
    let factory = factory();
    let cancel = CancellationToken::new();

    let lease = factory.lease(URL, &cancel).await.unwrap();
    assert_eq!(lease.client().base_url(), URL);
    lease.release();
}

#[test]
fn unpooled_factory_builds_fresh_clients() {
    let factory = factory().with_pooling(false);
    let client = factory.service_client(URL).unwrap();
    assert_eq!(client.base_url(), URL);
}
