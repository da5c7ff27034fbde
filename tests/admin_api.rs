//! Route management through the admin listener.

use hotgate::config::loader::load_config;
use hotgate::config::schema::Route;
use serde_json::{json, Value};

mod common;

const KEY: &str = "test-admin-key";

#[tokio::test]
async fn test_manage_routes_over_http() {
    let backend = common::start_echo_backend().await;
    let upstream = format!("http://{backend}");
    let admin_addr = common::closed_port().await;

    let mut config = common::test_config(vec![Route::new("/a/", &upstream)]);
    config.admin.enabled = true;
    config.admin.api_key = KEY.to_string();
    config.admin.bind_address = admin_addr.to_string();
    let gateway = common::start_gateway(config).await;

    let client = common::client();
    let admin = |path: &str| format!("http://{admin_addr}{path}");

    let res = client.get(admin("/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .post(admin("/admin/routes"))
        .bearer_auth(KEY)
        .json(&json!({ "path": "/b/", "upstream": upstream }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    let res = client.get(gateway.url("/b/hello")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/hello");

    let routes: Value = client
        .get(admin("/admin/routes"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(routes.as_array().unwrap().len(), 2);

    let res = client
        .delete(admin("/admin/routes"))
        .bearer_auth(KEY)
        .query(&[("path", "/a/")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let res = client.get(gateway.url("/a/x")).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let saved = load_config(&gateway.config_path).unwrap();
    assert_eq!(saved.routes, vec![Route::new("/b/", &upstream)]);

    let status: Value = client
        .get(admin("/admin/status"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["routes"], 1);
    assert!(status["generation"].as_u64().unwrap() >= 2);

    gateway.stop().await;
}

#[tokio::test]
async fn test_reload_endpoint_reports_bad_file() {
    let admin_addr = common::closed_port().await;
    let mut config = common::test_config(vec![]);
    config.watcher.enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = KEY.to_string();
    config.admin.bind_address = admin_addr.to_string();
    let gateway = common::start_gateway(config).await;
    let client = common::client();

    let res = client
        .post(format!("http://{admin_addr}/admin/reload"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(gateway.manager.generation(), 1);

    std::fs::write(&gateway.config_path, "[listener]\nbind_address = 42").unwrap();
    let res = client
        .post(format!("http://{admin_addr}/admin/reload"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 422);
    assert_eq!(gateway.manager.generation(), 1);

    gateway.stop().await;
}
