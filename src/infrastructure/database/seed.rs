//! Sample articles for a freshly provisioned store.

use std::time::Duration;

use super::{with_deadline, Database, DatabaseError, PoolBackend, StoreKind};

/// Article row inserted by the seeder.
#[derive(Debug, Clone, Copy)]
pub struct SampleArticle {
    pub title: &'static str,
    pub content: &'static str,
    pub category: &'static str,
    pub author: &'static str,
    pub featured: bool,
}

pub const SAMPLE_ARTICLES: &[SampleArticle] = &[
    SampleArticle {
        title: "দেশের নতুন অর্থনীতি নীতি",
        content: "বাংলাদেশ সরকার নতুন অর্থনীতি নীতি ঘোষণা করেছে যা দেশের উন্নয়নে গুরুত্বপূর্ণ ভূমিকা রাখবে।",
        category: "জাতীয়",
        author: "সিনিয়র রিপোর্টার",
        featured: true,
    },
    SampleArticle {
        title: "ক্রিকেট চ্যাম্পিয়নশিপে বাংলাদেশের জয়",
        content: "বাংলাদেশ ক্রিকেট দল আন্তর্জাতিক চ্যাম্পিয়নশিপে দারুণ পারফরম্যান্স দেখিয়েছে।",
        category: "খেলাধুলা",
        author: "স্পোর্টস এডিটর",
        featured: false,
    },
    SampleArticle {
        title: "কৃত্রিম বুদ্ধিমত্তার নতুন উদ্ভাবন",
        content: "বিশ্বব্যাপী কৃত্রিম বুদ্ধিমত্তার ক্ষেত্রে নতুন উদ্ভাবনী প্রযুক্তি আবিষ্কৃত হয়েছে।",
        category: "প্রযুক্তি",
        author: "টেক করেসপন্ডেন্ট",
        featured: true,
    },
    SampleArticle {
        title: "স্বাস্থ্যসেবায় নতুন মাত্রা",
        content: "দেশে স্বাস্থ্যসেবা খাতে যুগান্তকারী পরিবর্তন আসতে চলেছে যা সাধারণ মানুষের জীবনযাত্রার মান উন্নত করবে।",
        category: "স্বাস্থ্য",
        author: "হেলথ করেসপন্ডেন্ট",
        featured: false,
    },
];

fn insert_statement(kind: StoreKind) -> String {
    let placeholders: Vec<String> = (1..=5).map(|i| kind.placeholder(i)).collect();
    format!(
        "INSERT INTO articles (title, content, category, author, featured) VALUES ({})",
        placeholders.join(", ")
    )
}

async fn count_articles(db: &Database) -> Result<i64, DatabaseError> {
    let sql = "SELECT COUNT(*) FROM articles";
    let count = match db.pool().backend() {
        PoolBackend::Postgres(pool) => sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?,
        PoolBackend::Sqlite(pool) => sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?,
    };
    Ok(count)
}

async fn insert_article(
    db: &Database,
    statement: &str,
    article: &SampleArticle,
) -> Result<(), DatabaseError> {
    match db.pool().backend() {
        PoolBackend::Postgres(pool) => {
            sqlx::query(statement)
                .bind(article.title)
                .bind(article.content)
                .bind(article.category)
                .bind(article.author)
                .bind(article.featured)
                .execute(pool)
                .await?;
        }
        PoolBackend::Sqlite(pool) => {
            sqlx::query(statement)
                .bind(article.title)
                .bind(article.content)
                .bind(article.category)
                .bind(article.author)
                .bind(article.featured)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

/// Insert [`SAMPLE_ARTICLES`] when the articles table is empty.
///
/// Returns the number of rows inserted. A failing row is logged and skipped.
pub async fn seed_sample_articles(db: &Database, timeout: Duration) -> Result<usize, DatabaseError> {
    let existing = with_deadline("article count", timeout, count_articles(db)).await?;
    if existing > 0 {
        tracing::debug!(existing, "Articles present, skipping sample data");
        return Ok(0);
    }

    let statement = insert_statement(db.kind());
    let mut inserted = 0;

    for article in SAMPLE_ARTICLES {
        match with_deadline("sample insert", timeout, insert_article(db, &statement, article)).await {
            Ok(()) => inserted += 1,
            Err(e) => tracing::warn!(error = %e, title = article.title, "Error inserting sample article"),
        }
    }

    tracing::info!(inserted, "Sample data initialized");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_dialects() {
        assert_eq!(
            insert_statement(StoreKind::Postgres),
            "INSERT INTO articles (title, content, category, author, featured) VALUES ($1, $2, $3, $4, $5)"
        );
        assert!(insert_statement(StoreKind::Sqlite).ends_with("VALUES (?, ?, ?, ?, ?)"));
    }

    #[test]
    fn test_sample_set() {
        assert_eq!(SAMPLE_ARTICLES.len(), 4);
        assert_eq!(SAMPLE_ARTICLES.iter().filter(|a| a.featured).count(), 2);
    }
}
