use rusqlite::{params, Row};

use crate::{ctx::BaseParams, db, users::UserId, Error, Result};

use super::slug::generate_unique_slug;
use super::{CreateNote, DeleteNoteResponse, FindNotesResponse, Note, UpdateNote};

const NOTE_COLUMNS: &str = "id, slug, title, content, tag, color, is_pinned, is_archived, is_trashed, reminder_date, created_by, created_at, updated_at";

/// Attempts before giving up on the probe/insert loop. The unique index is
/// the final arbiter, a conflict here means another writer won the slug.
const SLUG_INSERT_ATTEMPTS: usize = 3;

impl<'a> TryFrom<&Row<'a>> for Note {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'a>) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: row.get(0)?,
            slug: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            tag: row.get(4)?,
            color: row.get(5)?,
            is_pinned: row.get(6)?,
            is_archived: row.get(7)?,
            is_trashed: row.get(8)?,
            reminder_date: row.get(9)?,
            created_by: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

#[derive(Clone)]
struct NewNote {
    title: String,
    content: String,
    tag: String,
    color: String,
    reminder_date: Option<chrono::DateTime<chrono::Utc>>,
    owner: UserId,
}

pub async fn create_note(args: CreateNote, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let title = args.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    let content = args.content.filter(|c| !c.is_empty());

    let (title, content) = match (title, content) {
        (Some(title), Some(content)) => (title, content),
        _ => return Err(Error::Validation("Title and content are required".into())),
    };

    let note = NewNote {
        title,
        content,
        tag: args.tag.filter(|t| !t.is_empty()).unwrap_or_else(|| "General".into()),
        color: args.color.filter(|c| !c.is_empty()).unwrap_or_else(|| "zinc".into()),
        reminder_date: args.reminder_date,
        owner: ctx.user_id(),
    };

    for _ in 0..SLUG_INSERT_ATTEMPTS {
        match insert_note(db.clone(), note.clone()).await {
            Err(Error::Conflict(_)) => continue,
            result => return result,
        }
    }

    Err(Error::Unexpected("Could not allocate a unique slug".into()))
}

async fn insert_note(db: db::DB, note: NewNote) -> Result<Note> {
    db.call(move |conn| {
        let slug = generate_unique_slug(&note.title, |candidate| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM notes WHERE slug = ?)",
                params![candidate],
                |row| row.get::<_, bool>(0),
            )
        })?;

        conn.query_row(
            &format!(
                r#"INSERT INTO notes (slug, title, content, tag, color, reminder_date, created_by)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING {NOTE_COLUMNS}"#
            ),
            params![slug, note.title, note.content, note.tag, note.color, note.reminder_date, note.owner],
            |row| Note::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(Error::from)
}

pub async fn find_notes(base: BaseParams) -> Result<FindNotesResponse> {
    find_by_trash_state(base, false).await
}

pub async fn find_trashed_notes(base: BaseParams) -> Result<FindNotesResponse> {
    find_by_trash_state(base, true).await
}

async fn find_by_trash_state(BaseParams { db, ctx }: BaseParams, trashed: bool) -> Result<FindNotesResponse> {
    let owner = ctx.user_id();

    db.call(move |conn| {
        let notes = conn
            .prepare(&format!(
                r#"SELECT {NOTE_COLUMNS} FROM notes WHERE created_by = ? AND is_trashed = ?
                ORDER BY COALESCE(updated_at, created_at) DESC"#
            ))?
            .query_map(params![owner, trashed], |row| Note::try_from(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(FindNotesResponse { results: notes })
    })
    .await
    .map_err(db::Error::from)
    .map_err(Error::from)
}

pub async fn get_note(slug: String, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let owner = ctx.user_id();

    db.call(move |conn| {
        conn.query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE slug = ? AND created_by = ?"),
            params![slug, owner],
            |row| Note::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message("Note not found"))
    .map_err(Error::from)
}

pub async fn update_note(slug: String, args: UpdateNote, BaseParams { db, ctx }: BaseParams) -> Result<Note> {
    let owner = ctx.user_id();

    db.call(move |conn| {
        let note = conn.query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE slug = ? AND created_by = ?"),
            params![slug, owner],
            |row| Note::try_from(row),
        )?;

        let mut title = note.title.clone();
        let mut new_slug = note.slug.clone();

        if let Some(new_title) = args.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if new_title != note.title {
                new_slug = generate_unique_slug(new_title, |candidate| {
                    conn.query_row(
                        "SELECT EXISTS(SELECT 1 FROM notes WHERE slug = ? AND id != ?)",
                        params![candidate, note.id],
                        |row| row.get::<_, bool>(0),
                    )
                })?;
                title = new_title.to_string();
            }
        }

        // empty values leave the stored field untouched, a clear-to-empty
        // is not possible through this endpoint
        let content = args.content.filter(|v| !v.is_empty()).unwrap_or(note.content);
        let tag = args.tag.filter(|v| !v.is_empty()).unwrap_or(note.tag);
        let color = args.color.filter(|v| !v.is_empty()).unwrap_or(note.color);
        let reminder_date = args.reminder_date.or(note.reminder_date);

        conn.query_row(
            &format!(
                r#"UPDATE notes SET slug = ?, title = ?, content = ?, tag = ?, color = ?, reminder_date = ?, updated_at = ?
                WHERE id = ?
                RETURNING {NOTE_COLUMNS}"#
            ),
            params![new_slug, title, content, tag, color, reminder_date, chrono::Utc::now(), note.id],
            |row| Note::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message("Note not found"))
    .map_err(Error::from)
}

pub async fn trash_note(slug: String, base: BaseParams) -> Result<Note> {
    set_trashed(slug, base, true).await
}

pub async fn restore_note(slug: String, base: BaseParams) -> Result<Note> {
    set_trashed(slug, base, false).await
}

async fn set_trashed(slug: String, BaseParams { db, ctx }: BaseParams, trashed: bool) -> Result<Note> {
    let owner = ctx.user_id();

    db.call(move |conn| {
        conn.query_row(
            &format!(
                r#"UPDATE notes SET is_trashed = ?, updated_at = ?
                WHERE slug = ? AND created_by = ?
                RETURNING {NOTE_COLUMNS}"#
            ),
            params![trashed, chrono::Utc::now(), slug, owner],
            |row| Note::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message("Note not found"))
    .map_err(Error::from)
}

pub async fn toggle_pin(slug: String, base: BaseParams) -> Result<Note> {
    toggle_flag(slug, base, "is_pinned").await
}

pub async fn toggle_archive(slug: String, base: BaseParams) -> Result<Note> {
    toggle_flag(slug, base, "is_archived").await
}

async fn toggle_flag(slug: String, BaseParams { db, ctx }: BaseParams, column: &'static str) -> Result<Note> {
    let owner = ctx.user_id();

    db.call(move |conn| {
        conn.query_row(
            &format!(
                r#"UPDATE notes SET {column} = NOT {column}, updated_at = ?
                WHERE slug = ? AND created_by = ?
                RETURNING {NOTE_COLUMNS}"#
            ),
            params![chrono::Utc::now(), slug, owner],
            |row| Note::try_from(row),
        )
        .map_err(|e| e.into())
    })
    .await
    .map_err(db::Error::from)
    .map_err(|e| e.not_found_message("Note not found"))
    .map_err(Error::from)
}

pub async fn permanent_delete_note(slug: String, BaseParams { db, ctx }: BaseParams) -> Result<DeleteNoteResponse> {
    let owner = ctx.user_id();

    db.call(move |conn| {
        let deleted = conn.execute(
            "DELETE FROM notes WHERE slug = ? AND created_by = ? AND is_trashed = 1",
            params![slug, owner],
        )?;

        if deleted == 0 {
            return Err(Error::NotFound("Note not found or not in trash".into()).into());
        }

        Ok(DeleteNoteResponse {
            message: "Note permanently deleted".into(),
        })
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use uuid::uuid;

    use super::*;
    use crate::{
        ctx::{Ctx, CurrentUser},
        db::{init_test_db, DB},
        users::auth::{create as create_user, CreateUserParameters},
    };

    async fn test_owner(db: &DB, email: &str) -> Ctx {
        let user = create_user(
            db.clone(),
            CreateUserParameters {
                name: "Test User".into(),
                email: email.into(),
                password_hash: "unused".into(),
            },
        )
        .await
        .unwrap();

        Ctx::new(CurrentUser {
            id: user.id,
            email: user.email,
        })
    }

    fn base(db: &DB, ctx: &Ctx) -> BaseParams {
        BaseParams::new(db.clone(), ctx.clone())
    }

    fn create_args(title: &str, content: &str) -> CreateNote {
        CreateNote {
            title: Some(title.into()),
            content: Some(content.into()),
            tag: None,
            color: None,
            reminder_date: None,
        }
    }

    #[tokio::test]
    async fn create_generates_sequential_slugs() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        let first = create_note(create_args("Meeting Notes", "Discuss Q3"), base(&db, &ctx)).await?;
        let second = create_note(create_args("Meeting Notes", "Discuss Q4"), base(&db, &ctx)).await?;
        let third = create_note(create_args("Meeting Notes", "Discuss Q1"), base(&db, &ctx)).await?;

        assert_eq!(first.slug, "meeting-notes");
        assert_eq!(second.slug, "meeting-notes-1");
        assert_eq!(third.slug, "meeting-notes-2");
        Ok(())
    }

    #[tokio::test]
    async fn slugs_are_unique_across_owners() -> Result<()> {
        let db = init_test_db().await?;
        let ada = test_owner(&db, "ada@mail.com").await;
        let bob = test_owner(&db, "bob@mail.com").await;

        let first = create_note(create_args("Groceries", "Milk"), base(&db, &ada)).await?;
        let second = create_note(create_args("Groceries", "Eggs"), base(&db, &bob)).await?;

        assert_eq!(first.slug, "groceries");
        assert_eq!(second.slug, "groceries-1");
        Ok(())
    }

    #[tokio::test]
    async fn create_applies_defaults() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        let note = create_note(create_args("Groceries", "Milk"), base(&db, &ctx)).await?;

        assert_eq!(note.tag, "General");
        assert_eq!(note.color, "zinc");
        assert!(!note.is_pinned);
        assert!(!note.is_archived);
        assert!(!note.is_trashed);
        assert_eq!(note.reminder_date, None);
        assert_eq!(note.created_by, ctx.user_id());
        Ok(())
    }

    #[tokio::test]
    async fn create_requires_title_and_content() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        let missing_content = CreateNote {
            title: Some("Groceries".into()),
            content: None,
            tag: None,
            color: None,
            reminder_date: None,
        };
        let result = create_note(missing_content, base(&db, &ctx)).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let blank_title = create_args("   ", "Milk");
        let result = create_note(blank_title, base(&db, &ctx)).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn slug_falls_back_for_symbol_titles() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        let first = create_note(create_args("!!!", "one"), base(&db, &ctx)).await?;
        let second = create_note(create_args("???", "two"), base(&db, &ctx)).await?;

        assert_eq!(first.slug, "note");
        assert_eq!(second.slug, "note-1");
        Ok(())
    }

    #[tokio::test]
    async fn rename_regenerates_slug() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Meeting Notes", "Discuss Q3"), base(&db, &ctx)).await?;

        let update = UpdateNote {
            title: Some("Groceries".into()),
            ..Default::default()
        };
        let updated = update_note("meeting-notes".into(), update, base(&db, &ctx)).await?;

        assert_eq!(updated.title, "Groceries");
        assert_eq!(updated.slug, "groceries");

        // the old slug no longer resolves
        let result = get_note("meeting-notes".into(), base(&db, &ctx)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn case_only_rename_keeps_slug() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Meeting Notes", "Discuss Q3"), base(&db, &ctx)).await?;

        let update = UpdateNote {
            title: Some("MEETING NOTES".into()),
            ..Default::default()
        };
        let updated = update_note("meeting-notes".into(), update, base(&db, &ctx)).await?;

        assert_eq!(updated.title, "MEETING NOTES");
        assert_eq!(updated.slug, "meeting-notes");
        Ok(())
    }

    #[tokio::test]
    async fn rename_collision_gets_a_suffix() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Alpha", "a"), base(&db, &ctx)).await?;
        create_note(create_args("Beta", "b"), base(&db, &ctx)).await?;

        let update = UpdateNote {
            title: Some("Alpha".into()),
            ..Default::default()
        };
        let updated = update_note("beta".into(), update, base(&db, &ctx)).await?;

        assert_eq!(updated.slug, "alpha-1");
        Ok(())
    }

    #[tokio::test]
    async fn update_ignores_empty_fields() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Groceries", "Milk"), base(&db, &ctx)).await?;

        let update = UpdateNote {
            content: Some("".into()),
            tag: Some("".into()),
            color: Some("".into()),
            ..Default::default()
        };
        let updated = update_note("groceries".into(), update, base(&db, &ctx)).await?;

        assert_eq!(updated.content, "Milk");
        assert_eq!(updated.tag, "General");
        assert_eq!(updated.color, "zinc");
        Ok(())
    }

    #[tokio::test]
    async fn update_replaces_supplied_fields() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Groceries", "Milk"), base(&db, &ctx)).await?;

        let update = UpdateNote {
            content: Some("Milk and eggs".into()),
            tag: Some("Errands".into()),
            color: Some("rose".into()),
            ..Default::default()
        };
        let updated = update_note("groceries".into(), update, base(&db, &ctx)).await?;

        assert_eq!(updated.content, "Milk and eggs");
        assert_eq!(updated.tag, "Errands");
        assert_eq!(updated.color, "rose");
        assert_eq!(updated.title, "Groceries");
        assert_eq!(updated.slug, "groceries");
        Ok(())
    }

    #[tokio::test]
    async fn update_keeps_reminder_when_absent() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        let reminder = chrono::Utc::now() + chrono::Duration::days(1);
        let args = CreateNote {
            reminder_date: Some(reminder),
            ..create_args("Groceries", "Milk")
        };
        create_note(args, base(&db, &ctx)).await?;

        let update = UpdateNote {
            content: Some("Milk and eggs".into()),
            ..Default::default()
        };
        let updated = update_note("groceries".into(), update, base(&db, &ctx)).await?;

        assert_eq!(updated.reminder_date, Some(reminder));
        Ok(())
    }

    #[tokio::test]
    async fn trash_restore_round_trip() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Groceries", "Milk"), base(&db, &ctx)).await?;
        let pinned = toggle_pin("groceries".into(), base(&db, &ctx)).await?;
        assert!(pinned.is_pinned);

        let trashed = trash_note("groceries".into(), base(&db, &ctx)).await?;
        assert!(trashed.is_trashed);
        assert!(trashed.is_pinned);

        // still addressable by slug while in the trash
        let fetched = get_note("groceries".into(), base(&db, &ctx)).await?;
        assert!(fetched.is_trashed);

        let active = find_notes(base(&db, &ctx)).await?;
        assert!(active.results.is_empty());

        let in_trash = find_trashed_notes(base(&db, &ctx)).await?;
        assert_eq!(in_trash.results.len(), 1);

        let restored = restore_note("groceries".into(), base(&db, &ctx)).await?;
        assert!(!restored.is_trashed);
        assert!(restored.is_pinned);
        assert_eq!(restored.title, "Groceries");
        assert_eq!(restored.slug, "groceries");
        assert_eq!(restored.content, "Milk");
        assert_eq!(restored.tag, "General");
        assert_eq!(restored.color, "zinc");
        Ok(())
    }

    #[tokio::test]
    async fn trash_is_idempotent() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Groceries", "Milk"), base(&db, &ctx)).await?;

        trash_note("groceries".into(), base(&db, &ctx)).await?;
        let again = trash_note("groceries".into(), base(&db, &ctx)).await?;

        assert!(again.is_trashed);
        Ok(())
    }

    #[tokio::test]
    async fn permanent_delete_requires_trash() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Groceries", "Milk"), base(&db, &ctx)).await?;

        let result = permanent_delete_note("groceries".into(), base(&db, &ctx)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        // the note survived the failed delete
        let note = get_note("groceries".into(), base(&db, &ctx)).await?;
        assert!(!note.is_trashed);

        trash_note("groceries".into(), base(&db, &ctx)).await?;
        permanent_delete_note("groceries".into(), base(&db, &ctx)).await?;

        let result = get_note("groceries".into(), base(&db, &ctx)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let in_trash = find_trashed_notes(base(&db, &ctx)).await?;
        assert!(in_trash.results.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn toggle_pin_twice_round_trips() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Groceries", "Milk"), base(&db, &ctx)).await?;

        let pinned = toggle_pin("groceries".into(), base(&db, &ctx)).await?;
        assert!(pinned.is_pinned);

        let unpinned = toggle_pin("groceries".into(), base(&db, &ctx)).await?;
        assert!(!unpinned.is_pinned);
        Ok(())
    }

    #[tokio::test]
    async fn toggle_archive_is_independent_of_trash() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Groceries", "Milk"), base(&db, &ctx)).await?;
        trash_note("groceries".into(), base(&db, &ctx)).await?;

        let archived = toggle_archive("groceries".into(), base(&db, &ctx)).await?;
        assert!(archived.is_archived);
        assert!(archived.is_trashed);
        Ok(())
    }

    #[tokio::test]
    async fn notes_are_scoped_to_their_owner() -> Result<()> {
        let db = init_test_db().await?;
        let ada = test_owner(&db, "ada@mail.com").await;
        let bob = test_owner(&db, "bob@mail.com").await;

        create_note(create_args("Groceries", "Milk"), base(&db, &ada)).await?;

        let result = get_note("groceries".into(), base(&db, &bob)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let update = UpdateNote {
            content: Some("hijacked".into()),
            ..Default::default()
        };
        let result = update_note("groceries".into(), update, base(&db, &bob)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let result = trash_note("groceries".into(), base(&db, &bob)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let listed = find_notes(base(&db, &bob)).await?;
        assert!(listed.results.is_empty());

        let note = get_note("groceries".into(), base(&db, &ada)).await?;
        assert_eq!(note.content, "Milk");
        Ok(())
    }

    #[tokio::test]
    async fn listing_orders_by_most_recent_update() -> Result<()> {
        let db = init_test_db().await?;
        let ctx = test_owner(&db, "ada@mail.com").await;

        create_note(create_args("Older", "1"), base(&db, &ctx)).await?;
        create_note(create_args("Newer", "2"), base(&db, &ctx)).await?;

        let update = UpdateNote {
            content: Some("1, revisited".into()),
            ..Default::default()
        };
        update_note("older".into(), update, base(&db, &ctx)).await?;

        let listed = find_notes(base(&db, &ctx)).await?;
        assert_eq!(listed.results.len(), 2);
        assert_eq!(listed.results[0].slug, "older");
        Ok(())
    }

    #[tokio::test]
    async fn lists_seeded_notes() -> Result<()> {
        let db = init_test_db().await?;

        db.call(|conn| {
            conn.execute_batch(
                r#"
                INSERT INTO users (id, name, email, password) VALUES (uuid_blob('018f6146-32f4-7948-8289-cfb5cdb2b2af'), 'Seeded', 'seeded@mail.com', 'x');
                INSERT INTO notes (slug, title, content, created_by) VALUES ('first', 'first', '1', uuid_blob('018f6146-32f4-7948-8289-cfb5cdb2b2af'));
                INSERT INTO notes (slug, title, content, created_by) VALUES ('second', 'second', '2', uuid_blob('018f6146-32f4-7948-8289-cfb5cdb2b2af'));
                INSERT INTO notes (slug, title, content, created_by) VALUES ('third', 'third', '3', uuid_blob('018f6146-32f4-7948-8289-cfb5cdb2b2af'));
                "#,
            )
            .unwrap();
            Ok(())
        })
        .await
        .unwrap();

        let ctx = Ctx::new(CurrentUser {
            id: uuid!("018f6146-32f4-7948-8289-cfb5cdb2b2af"),
            email: "seeded@mail.com".into(),
        });

        let listed = find_notes(base(&db, &ctx)).await?;
        assert_eq!(listed.results.len(), 3);
        Ok(())
    }
}
