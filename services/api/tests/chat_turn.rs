mod common;

use api_lib::adapters::InMemoryStore;
use common::{ScriptedGenerator, ALICE, BOB};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use talki_core::{
    domain::{Message, NewMaterial, SenderType},
    ports::{ChatStore, MaterialStore, MessageStore, PortError},
    ChatOrchestrator,
};
use uuid::Uuid;

fn orchestrator_over(
    store: &InMemoryStore,
    generator: Arc<ScriptedGenerator>,
    reply_timeout: Duration,
) -> ChatOrchestrator {
    ChatOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        generator,
        reply_timeout,
    )
}

/// A chat owned by ALICE, seeded with the usual greeting.
async fn seeded_chat(store: &InMemoryStore) -> Uuid {
    let material = store
        .create_material(NewMaterial {
            owner_uid: ALICE.to_string(),
            title: "Jobs".to_string(),
            content: "A text about careers.".to_string(),
        })
        .await
        .unwrap();
    let chat = store.create_chat(material.id, ALICE, "Jobs").await.unwrap();
    store
        .create_message(Message::system(chat.id, ALICE, "Hello"))
        .await
        .unwrap();
    chat.id
}

#[tokio::test]
async fn successful_turn_stores_both_messages_in_order() {
    let store = InMemoryStore::new();
    let generator = ScriptedGenerator::new();
    generator.push_reply("Nice to meet you!");
    let orchestrator = orchestrator_over(&store, generator, Duration::from_secs(5));
    let chat_id = seeded_chat(&store).await;

    let reply = orchestrator
        .send_message(chat_id, ALICE, "I am a software engineer")
        .await
        .unwrap();

    assert_eq!(reply, "Nice to meet you!");
    let messages = store.get_messages(chat_id).await.unwrap();
    let senders: Vec<SenderType> = messages.iter().map(|m| m.sender).collect();
    assert_eq!(
        senders,
        vec![SenderType::System, SenderType::User, SenderType::Bot]
    );
    assert_eq!(messages[1].content, "I am a software engineer");
    assert_eq!(messages[1].owner_uid.as_deref(), Some(ALICE));
    assert!(messages[2].owner_uid.is_none());
    assert!(!store.get_chat_by_id(chat_id).await.unwrap().pending);
}

#[tokio::test]
async fn history_excludes_the_new_message_and_is_oldest_first() {
    let store = InMemoryStore::new();
    let generator = ScriptedGenerator::new();
    generator.push_reply("first reply");
    generator.push_reply("second reply");
    let orchestrator = orchestrator_over(&store, generator.clone(), Duration::from_secs(5));
    let chat_id = seeded_chat(&store).await;

    orchestrator.send_message(chat_id, ALICE, "one").await.unwrap();
    orchestrator.send_message(chat_id, ALICE, "two").await.unwrap();

    let calls = generator.calls();
    assert_eq!(calls.len(), 2);

    let (history, content) = &calls[0];
    assert_eq!(content, "one");
    let texts: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["Hello"]);

    let (history, content) = &calls[1];
    assert_eq!(content, "two");
    let texts: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["Hello", "one", "first reply"]);
}

#[tokio::test]
async fn failed_generation_keeps_only_the_user_message() {
    let store = InMemoryStore::new();
    let generator = ScriptedGenerator::new();
    generator.push_reply_error(PortError::Generation("upstream 500".to_string()));
    let orchestrator = orchestrator_over(&store, generator, Duration::from_secs(5));
    let chat_id = seeded_chat(&store).await;
    let before = store.get_messages(chat_id).await.unwrap().len();

    let result = orchestrator.send_message(chat_id, ALICE, "Hi").await;

    assert!(matches!(result, Err(PortError::Generation(_))));
    let messages = store.get_messages(chat_id).await.unwrap();
    assert_eq!(messages.len(), before + 1);
    assert_eq!(messages.last().unwrap().sender, SenderType::User);
    assert!(!store.get_chat_by_id(chat_id).await.unwrap().pending);
}

#[tokio::test]
async fn slow_generation_times_out_and_clears_pending() {
    let store = InMemoryStore::new();
    let generator = ScriptedGenerator::new();
    generator.push_reply("too late");
    generator.set_delay(Duration::from_millis(500));
    let orchestrator = orchestrator_over(&store, generator, Duration::from_millis(50));
    let chat_id = seeded_chat(&store).await;
    let before = store.get_messages(chat_id).await.unwrap().len();

    let result = orchestrator.send_message(chat_id, ALICE, "Hi").await;

    assert!(matches!(result, Err(PortError::Generation(_))));
    assert_eq!(store.get_messages(chat_id).await.unwrap().len(), before + 1);
    assert!(!store.get_chat_by_id(chat_id).await.unwrap().pending);
}

#[tokio::test]
async fn missing_chat_is_not_found() {
    let store = InMemoryStore::new();
    let orchestrator = orchestrator_over(&store, ScriptedGenerator::new(), Duration::from_secs(5));

    let result = orchestrator.send_message(Uuid::new_v4(), ALICE, "Hi").await;

    assert!(matches!(result, Err(PortError::NotFound(_))));
}

#[tokio::test]
async fn another_users_chat_is_unauthorized_and_untouched() {
    let store = InMemoryStore::new();
    let generator = ScriptedGenerator::new();
    generator.push_reply("should not be used");
    let orchestrator = orchestrator_over(&store, generator.clone(), Duration::from_secs(5));
    let chat_id = seeded_chat(&store).await;

    let result = orchestrator.send_message(chat_id, BOB, "Hi").await;

    assert_eq!(result, Err(PortError::Unauthorized));
    assert_eq!(store.get_messages(chat_id).await.unwrap().len(), 1);
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn blank_content_is_rejected_before_anything_is_stored() {
    let store = InMemoryStore::new();
    let orchestrator = orchestrator_over(&store, ScriptedGenerator::new(), Duration::from_secs(5));
    let chat_id = seeded_chat(&store).await;

    let result = orchestrator.send_message(chat_id, ALICE, "  \n").await;

    assert!(matches!(result, Err(PortError::Validation(_))));
    assert_eq!(store.get_messages(chat_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_turns_on_one_chat_are_serialized() {
    let store = InMemoryStore::new();
    let generator = ScriptedGenerator::new();
    for i in 0..4 {
        generator.push_reply(&format!("reply {}", i));
    }
    generator.set_delay(Duration::from_millis(20));
    let orchestrator = Arc::new(orchestrator_over(
        &store,
        generator.clone(),
        Duration::from_secs(5),
    ));
    let chat_id = seeded_chat(&store).await;

    let turns = (0..4).map(|i| {
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .send_message(chat_id, ALICE, &format!("message {}", i))
                .await
        }
    });
    let results = futures::future::join_all(turns).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(generator.max_in_flight.load(Ordering::SeqCst), 1);

    // Every user message is directly followed by its bot reply.
    let messages = store.get_messages(chat_id).await.unwrap();
    assert_eq!(messages.len(), 9);
    for pair in messages[1..].chunks(2) {
        assert_eq!(pair[0].sender, SenderType::User);
        assert_eq!(pair[1].sender, SenderType::Bot);
    }
    assert!(!store.get_chat_by_id(chat_id).await.unwrap().pending);
}

#[tokio::test]
async fn dropped_caller_does_not_leave_the_chat_pending() {
    let store = InMemoryStore::new();
    let generator = ScriptedGenerator::new();
    generator.push_reply("still delivered");
    generator.set_delay(Duration::from_millis(300));
    let orchestrator = Arc::new(orchestrator_over(
        &store,
        generator.clone(),
        Duration::from_secs(5),
    ));
    let chat_id = seeded_chat(&store).await;

    let caller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.send_message(chat_id, ALICE, "Hi").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.get_chat_by_id(chat_id).await.unwrap().pending);
    caller.abort();

    // The turn keeps going without its caller and finishes normally.
    let mut pending = true;
    for _ in 0..100 {
        pending = store.get_chat_by_id(chat_id).await.unwrap().pending;
        if !pending {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!pending);

    let messages = store.get_messages(chat_id).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].sender, SenderType::Bot);
    assert_eq!(messages[2].content, "still delivered");
}
