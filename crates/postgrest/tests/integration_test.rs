#![cfg(feature = "integration-tests")]

// Live checks against a project migrated with `classvibes-migration`.
// Run with `--features integration-tests` and SUPABASE_URL / SUPABASE_ANON_KEY set.

use classvibes_postgrest::{PostgrestClient, SortOrder};
use dotenvy::dotenv;
use reqwest::Client;
use serde_json::Value;
use std::env;

fn create_test_client(table: &str) -> PostgrestClient {
    dotenv().ok();
    let url = env::var("SUPABASE_URL").expect("SUPABASE_URL must be set for integration tests");
    let key = env::var("SUPABASE_ANON_KEY")
        .expect("SUPABASE_ANON_KEY must be set for integration tests");
    PostgrestClient::new(&url, &key, table, Client::new())
}

#[tokio::test]
async fn test_connection_and_basic_select() {
    let result = create_test_client("cursos")
        .select("*")
        .limit(1)
        .execute::<Value>()
        .await;

    assert!(result.is_ok(), "Failed to select from cursos: {:?}", result.err());
}

#[tokio::test]
async fn test_seeded_profiles_exist() {
    let profiles = create_test_client("perfiles")
        .select("id,nombre")
        .order("id", SortOrder::Ascending)
        .execute::<Value>()
        .await
        .expect("perfiles should be readable");

    let names: Vec<String> = profiles
        .iter()
        .filter_map(|p| p["nombre"].as_str())
        .map(str::to_lowercase)
        .collect();

    for expected in ["admin", "profesor", "alumno"] {
        assert!(names.iter().any(|n| n == expected), "missing profile {}", expected);
    }
}
