mod common;

use common::{Note, database};
use futures::future::try_join_all;
use modelkit::{CallerContext, Crud, Database, SaveOptions};
use std::collections::HashSet;

async fn save_note(db: Database, index: i64) -> modelkit::Result<Note> {
    let session = db.session();
    let mut note = Note::new(index % 3, &format!("note {index}"), index);
    let _ = note
        .save(&session, &CallerContext::user(index % 3), SaveOptions::default())
        .await?;
    Ok(note)
}

#[tokio::test]
async fn test_concurrent_sessions_get_distinct_ids_and_tokens() -> anyhow::Result<()> {
    let db = database().await?;

    let notes = try_join_all((0..50).map(|index| save_note(db.clone(), index))).await?;

    let ids: HashSet<_> = notes.iter().map(|note| note.base.id()).collect();
    let tokens: HashSet<_> = notes.iter().map(|note| note.base.token().to_string()).collect();
    assert_eq!(ids.len(), 50);
    assert_eq!(tokens.len(), 50);
    assert_eq!(db.store().row_count("note").await?, 50);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_spawned_tasks_share_one_database() -> anyhow::Result<()> {
    let db = database().await?;

    let handles = (0..20)
        .map(|index| tokio::spawn(save_note(db.clone(), index)))
        .collect::<Vec<_>>();

    for handle in handles {
        handle.await??;
    }

    let session = db.session();
    assert_eq!(Note::query(&session).count().await?, 20);
    assert_eq!(
        Note::get_all_owned(&session, &CallerContext::user(0), None)
            .await?
            .len(),
        7
    );

    Ok(())
}
