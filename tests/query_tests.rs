mod common;

use common::{Note, User, database};
use modelkit::{CallerContext, Crud, ModelError, Order, SaveOptions};

async fn seed(session: &modelkit::Session) -> anyhow::Result<()> {
    let system = CallerContext::system();
    let rows = [
        (1, "alpha", 3),
        (1, "bravo", 1),
        (2, "charlie", 5),
        (2, "delta", 2),
        (1, "echo", 4),
    ];
    for (user_id, title, rank) in rows {
        let mut note = Note::new(user_id, title, rank);
        let _ = note.save(session, &system, SaveOptions::default()).await?;
    }
    Ok(())
}

fn titles(notes: &[Note]) -> Vec<&str> {
    notes.iter().map(|note| note.title.as_str()).collect()
}

#[tokio::test]
async fn test_get_all_is_ordered_by_id() -> anyhow::Result<()> {
    let db = database().await?;
    let session = db.session();
    seed(&session).await?;

    let all = Note::get_all(&session, None).await?;
    assert_eq!(titles(&all), ["alpha", "bravo", "charlie", "delta", "echo"]);

    let limited = Note::get_all(&session, Some(2)).await?;
    assert_eq!(titles(&limited), ["alpha", "bravo"]);

    Ok(())
}

#[tokio::test]
async fn test_filter_order_and_paging() -> anyhow::Result<()> {
    let db = database().await?;
    let session = db.session();
    seed(&session).await?;

    let ranked = Note::query(&session)
        .order_by("rank", Order::Desc)
        .all()
        .await?;
    assert_eq!(titles(&ranked), ["charlie", "echo", "alpha", "delta", "bravo"]);

    let page = Note::query(&session)
        .order_by("title", Order::Asc)
        .offset(1)
        .limit(2)
        .all()
        .await?;
    assert_eq!(titles(&page), ["bravo", "charlie"]);

    let count = Note::query(&session).filter_by("user_id", 2).count().await?;
    assert_eq!(count, 2);

    let top = Note::query(&session)
        .filter_by("user_id", 1)
        .order_by("rank", Order::Desc)
        .first()
        .await?;
    assert_eq!(top.map(|note| note.title), Some("echo".to_string()));

    Ok(())
}

#[tokio::test]
async fn test_unknown_query_column_is_rejected() -> anyhow::Result<()> {
    let db = database().await?;
    let session = db.session();

    let err = Note::query(&session)
        .filter_by("colour", "red")
        .all()
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::UnknownField { ref column, .. } if column == "colour"));

    let err = Note::query(&session)
        .order_by("colour", Order::Asc)
        .count()
        .await
        .unwrap_err();
    assert!(err.is_validation());

    Ok(())
}

#[tokio::test]
async fn test_owned_listing() -> anyhow::Result<()> {
    let db = database().await?;
    let session = db.session();
    seed(&session).await?;

    let mine = Note::get_all_owned(&session, &CallerContext::user(1), None).await?;
    assert_eq!(titles(&mine), ["alpha", "bravo", "echo"]);

    let limited = Note::get_all_owned(&session, &CallerContext::user(2), Some(1)).await?;
    assert_eq!(titles(&limited), ["charlie"]);

    let anonymous = Note::get_all_owned(&session, &CallerContext::anonymous(), None).await?;
    assert!(anonymous.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_owned_listing_without_owner_column() -> anyhow::Result<()> {
    let db = database().await?;
    let session = db.session();

    let mut user = User::new("owner@example.com", "Owner", "pw");
    let _ = user
        .save(&session, &CallerContext::system(), SaveOptions::default())
        .await?;

    let listed = User::get_all_owned(&session, &CallerContext::user(42), None).await?;
    assert_eq!(listed.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_queries_see_staged_writes() -> anyhow::Result<()> {
    let db = database().await?;
    let session = db.session();

    session.begin().await?;
    seed(&session).await?;

    assert_eq!(Note::query(&session).count().await?, 5);
    assert_eq!(Note::query(&db.session()).count().await?, 0);

    session.rollback()?;
    assert_eq!(Note::query(&session).count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_anonymous_owned_listing_of_unregistered_table_fails() -> anyhow::Result<()> {
    let db = modelkit::Database::new(common::test_config())?;
    let session = db.session();
    let anonymous = CallerContext::anonymous();

    let err = Note::get_all_owned(&session, &anonymous, None)
        .await
        .unwrap_err();
    assert_eq!(err, ModelError::Unregistered("note".into()));

    let err = Note::query(&session)
        .owned_by(&anonymous)
        .count()
        .await
        .unwrap_err();
    assert_eq!(err, ModelError::Unregistered("note".into()));

    Ok(())
}
