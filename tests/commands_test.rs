use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const PROVIDER_KEY_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "AI_API_KEY",
    "OPENROUTER_API_KEY",
    "DEEPSEEK_API_KEY",
    "AI_BASE_URL",
    "AI_MODEL",
];

fn chat_todo(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chat-todo");
    for var in PROVIDER_KEY_VARS {
        cmd.env_remove(var);
    }
    cmd.current_dir(root)
        .env("CHATTODO_HOME", root.join("home"))
        .env("CHATTODO_CONFIG_PATH", root.join("missing-config.toml"));
    cmd
}

fn activity(title: &str, id: u64, fun: f64, int: f64, city: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "activityId": format!("seed-{id}"),
        "activity": title,
        "funScore": fun,
        "interestingScore": int,
        "score": 0.0,
        "confidence": 0.9,
        "category": "hobbies",
        "isCompound": false,
        "action": null,
        "actionOriginal": null,
        "object": "pottery",
        "objectOriginal": null,
        "placeName": null,
        "placeQuery": null,
        "city": city,
        "region": null,
        "country": null,
        "keywords": [],
        "image": {"mediaKey": "pottery", "preferStock": false},
        "link": null,
        "messages": [{
            "id": id,
            "sender": "Alice",
            "timestamp": "2024-03-09T18:00:00Z",
            "message": format!("what about {title}")
        }]
    })
}

#[test]
fn aggregate_merges_variants_and_keeps_city_mismatches_apart() {
    let tmp = tempdir().expect("tempdir");
    let input = tmp.path().join("activities.json");
    let activities = serde_json::json!([
        activity("pottery class", 1, 0.8, 0.6, None),
        activity("Pottery Class", 2, 0.6, 0.4, None),
        activity("pottery classes", 3, 0.7, 0.5, None),
        activity("Wheel throwing in Wellington", 4, 3.0, 3.0, Some("Wellington")),
    ]);
    fs::write(&input, activities.to_string()).expect("write input");

    let out = tmp.path().join("merged.json");
    chat_todo(tmp.path())
        .args(["aggregate", "--activities"])
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicates::str::contains("activities=1"));

    let merged: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("read")).expect("json");
    let merged = merged.as_array().expect("array");
    // The Wellington entry shares the media key and no city on the other
    // side, so it is a wildcard match and joins the group.
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0]["messages"].as_array().map(Vec::len), Some(4));
    assert_eq!(merged[0]["activity"], "pottery class");
    assert_eq!(merged[0]["activityId"].as_str().map(str::len), Some(64));
}

#[test]
fn aggregate_prints_to_stdout_without_out_flag() {
    let tmp = tempdir().expect("tempdir");
    let input = tmp.path().join("activities.json");
    let activities = serde_json::json!([
        activity("Pottery class", 1, 4.0, 4.0, Some("Auckland")),
        activity("Clay workshop", 2, 2.0, 2.0, Some("Wellington")),
    ]);
    fs::write(&input, activities.to_string()).expect("write input");

    let output = chat_todo(tmp.path())
        .args(["aggregate", "--activities"])
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let merged: serde_json::Value = serde_json::from_slice(&output).expect("stdout is json");
    assert_eq!(merged.as_array().map(Vec::len), Some(2));
}

#[test]
fn cache_prune_removes_expired_entries() {
    let tmp = tempdir().expect("tempdir");
    let shard = tmp.path().join("home/cache/abcdef012345/aa");
    fs::create_dir_all(&shard).expect("mkdir");
    let expired = serde_json::json!({
        "data": {"provider": "p/m", "text": "[]", "usage": {"inputTokens": 1, "outputTokens": 1}},
        "cachedAt": 1,
        "expiresAt": 2
    });
    let fresh = serde_json::json!({
        "data": {"provider": "p/m", "text": "[]", "usage": {"inputTokens": 1, "outputTokens": 1}},
        "cachedAt": 1,
        "expiresAt": null
    });
    fs::write(shard.join("aa01.json"), expired.to_string()).expect("write expired");
    fs::write(shard.join("aa02.json"), fresh.to_string()).expect("write fresh");

    chat_todo(tmp.path())
        .arg("cache-prune")
        .assert()
        .success()
        .stdout(predicates::str::contains("removed=1"));
    assert!(!shard.join("aa01.json").exists());
    assert!(shard.join("aa02.json").exists());
}

#[test]
fn providers_reports_missing_credentials() {
    let tmp = tempdir().expect("tempdir");
    chat_todo(tmp.path())
        .env("CHATTODO_PROVIDERS", "anthropic,openai:gpt-4.1-mini")
        .env("OPENAI_API_KEY", "sk-test")
        .arg("providers")
        .assert()
        .failure()
        .stdout(predicates::str::contains("primary provider=anthropic"))
        .stdout(predicates::str::contains("fallback provider=openai model=gpt-4.1-mini credentials=present"))
        .stdout(predicates::str::contains("ANTHROPIC_API_KEY"))
        .stdout(predicates::str::contains("sk-test").not());
}

#[test]
fn verify_strict_flags_unknown_env_keys() {
    let tmp = tempdir().expect("tempdir");
    let typo = format!("{}{}", "CHATTODO_", "BATCH_SIZ");
    chat_todo(tmp.path())
        .env("ANTHROPIC_API_KEY", "test")
        .env(&typo, "5")
        .args(["verify", "--strict"])
        .assert()
        .failure()
        .stdout(predicates::str::contains(format!("unknown environment variable {typo}")));

    chat_todo(tmp.path())
        .env("ANTHROPIC_API_KEY", "test")
        .arg("verify")
        .assert()
        .success()
        .stdout(predicates::str::contains("config: ok"));
}

#[test]
fn verify_rejects_invalid_config_file() {
    let tmp = tempdir().expect("tempdir");
    let config = tmp.path().join("config.toml");
    fs::write(&config, "[aggregate]\ntitle_similarity = 1.5\nplace_similarity = 0.95\n")
        .expect("write config");
    chat_todo(tmp.path())
        .env("CHATTODO_CONFIG_PATH", &config)
        .env("ANTHROPIC_API_KEY", "test")
        .arg("verify")
        .assert()
        .failure()
        .stdout(predicates::str::contains("config invalid"));
}
