// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::*;

#[tokio::test]
async fn create_store() {
    // Create new store.
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    assert!(store.is_ok());
}

#[tokio::test]
async fn read_write_value() {
    // Create new store.
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();

    // Write value to the store.
    let key = vec![0u8, 1u8, 2u8];
    let value = vec![4u8, 5u8, 6u8];
    store.write(key.clone(), value.clone()).await.unwrap();

    // Read value.
    let result = store.read(key).await.unwrap();
    assert_eq!(result, Some(value));
}

#[tokio::test]
async fn read_unknown_key() {
    // Create new store.
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();

    // Try to read unknown key.
    let result = store.read(vec![0u8]).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn idempotent_write() {
    // Create new store.
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();

    // Write the same key twice with the same value.
    let key = vec![7u8];
    let value = vec![8u8, 9u8];
    store.write(key.clone(), value.clone()).await.unwrap();
    store.write(key.clone(), value.clone()).await.unwrap();

    // The value is unchanged.
    let result = store.read(key).await.unwrap();
    assert_eq!(result, Some(value));
}

#[tokio::test]
async fn concurrent_read_write() {
    // Create new store.
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path()).unwrap();

    // Write values concurrently.
    let mut handles = Vec::new();
    for i in 0u8..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.write(vec![i], vec![i, i]).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // All values are present.
    for i in 0u8..10 {
        let result = store.read(vec![i]).await.unwrap();
        assert_eq!(result, Some(vec![i, i]));
    }
}
