mod support;

use portal_crawlers::crawler::{BloggerCrawler, Crawler};
use portal_crawlers::identity::generate_uuid;
use portal_crawlers::model::{CrawlSession, CrawlerInfo, CrawlerType};
use serde_json::{Value, json};

use support::{Routes, StubServer, fetcher, ok};

fn entry(base_url: &str, post: u32, title: &str, updated: &str, label: &str) -> Value {
    json!({
        "id": { "$t": format!("tag:blogger.com,1999:blog-42.post-{post}") },
        "title": { "$t": title },
        "content": { "$t": "<p>Body &amp; soul</p>" },
        "published": { "$t": "2024-01-03T10:00:00.000+00:00" },
        "updated": { "$t": updated },
        "link": [
            { "rel": "self", "href": format!("{base_url}/feeds/42/posts/default/{post}") },
            { "rel": "alternate", "href": format!("{base_url}/2024/01/post-{post}.html") }
        ],
        "category": [ { "term": label } ],
        "author": [ { "name": { "$t": "Grace" } } ],
        "media$thumbnail": { "url": format!("https://cdn.test/{post}.jpg") }
    })
}

fn blog_routes(base_url: &str) -> Routes {
    let next = format!("{base_url}/feeds/42/posts/default?alt=json&start-index=21&max-results=20");
    let older = entry(base_url, 7, "Hello &amp; Goodbye", "2024-01-04T00:00:00.000+00:00", "Rust");
    let newer = entry(base_url, 8, "Later", "2024-02-01T00:00:00.000+00:00", "Async");

    Routes::from([
        (
            "/feeds/posts/summary?alt=json&max-results=0".to_owned(),
            ok(json!({ "feed": {
                "id": { "$t": "tag:blogger.com,1999:blog-42" },
                "category": [ { "term": "Rust" }, { "term": "Async" } ]
            } })),
        ),
        (
            "/feeds/42/posts/default?alt=json&max-results=20".to_owned(),
            ok(json!({ "feed": {
                "link": [ { "rel": "next", "href": next } ],
                "entry": [ older.clone(), newer ]
            } })),
        ),
        (
            "/feeds/42/posts/default?alt=json&start-index=21&max-results=20".to_owned(),
            ok(json!({ "feed": {
                "entry": [ entry(base_url, 9, "Oldest", "2023-12-01T00:00:00.000+00:00", "Rust") ]
            } })),
        ),
        (
            "/feeds/42/posts/default/7?alt=json".to_owned(),
            ok(json!({ "entry": older })),
        ),
    ])
}

fn crawler(base_url: &str, info: CrawlerInfo) -> BloggerCrawler {
    BloggerCrawler::new(
        CrawlerInfo {
            url: base_url.to_owned(),
            crawler_type: CrawlerType::Blogger,
            ..info
        },
        fetcher(),
    )
    .with_feed_base(format!("{base_url}/feeds/"))
}

#[tokio::test]
async fn summary_feed_yields_blog_id_and_labels() {
    let server = StubServer::start(blog_routes);
    let crawler = crawler(&server.base_url, CrawlerInfo::default());
    let mut session = CrawlSession::default();

    let categories = crawler
        .fetch_categories(&mut session)
        .await
        .expect("fetch categories");

    assert_eq!(session.web_id.as_deref(), Some("42"));
    let titles = categories.iter().map(|c| c.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["Async", "Rust"]);
    assert_eq!(categories[1].id, generate_uuid("Rust"));
    assert_eq!(
        categories[1].url,
        format!("{}/search/label/Rust", server.base_url)
    );
}

#[tokio::test]
async fn default_page_resolves_blog_id_and_follows_next_link() {
    let server = StubServer::start(blog_routes);
    let mut crawler = crawler(
        &server.base_url,
        CrawlerInfo {
            set_author: true,
            ..CrawlerInfo::default()
        },
    );
    let mut session = CrawlSession::default();
    let categories = crawler
        .fetch_categories(&mut CrawlSession::default())
        .await
        .expect("fetch categories");
    crawler.set_categories(categories);

    let contents = crawler.fetch_contents(&mut session, None, None).await;

    assert_eq!(session.web_id.as_deref(), Some("42"));
    assert_eq!(
        session.web_url,
        Some(format!(
            "{}/feeds/42/posts/default?alt=json&start-index=21&max-results=20",
            server.base_url
        ))
    );

    let titles = contents
        .iter()
        .filter_map(|c| c.title.as_deref())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["Later", "Hello & Goodbye"]);

    let hello = &contents[1];
    assert_eq!(hello.details.as_deref(), Some("<p>Body & soul</p>"));
    assert_eq!(hello.tags.as_deref(), Some("Rust"));
    assert_eq!(hello.category_id, Some(generate_uuid("Rust")));
    assert_eq!(hello.author.as_deref(), Some("Grace"));
    assert_eq!(hello.thumbnail_url.as_deref(), Some("https://cdn.test/7.jpg"));
    assert_eq!(
        hello.source_url,
        Some(format!("{}/2024/01/post-7.html", server.base_url))
    );

    let next = session.web_url.clone();
    let older = crawler
        .fetch_contents(&mut session, next.as_deref(), None)
        .await;
    assert_eq!(older.len(), 1);
    assert_eq!(session.web_url, None);
}

#[tokio::test]
async fn source_uri_fetches_the_same_entry() {
    let server = StubServer::start(blog_routes);
    let crawler = crawler(&server.base_url, CrawlerInfo::default());
    let mut session = CrawlSession::default();

    let contents = crawler.fetch_contents(&mut session, None, None).await;
    let listed = contents
        .iter()
        .find(|c| c.title.as_deref() == Some("Hello & Goodbye"))
        .expect("listed entry");
    let source_uri = listed.source_uri.clone().expect("source uri");
    assert_eq!(
        source_uri,
        format!("{}/feeds/42/posts/default/7?alt=json", server.base_url)
    );

    let fetched = crawler
        .fetch_content(&source_uri, None)
        .await
        .expect("fetch content");
    assert_eq!(&fetched, listed);
}

#[tokio::test]
async fn failing_page_yields_empty_and_clears_cursor() {
    let server = StubServer::start(blog_routes);
    let crawler = crawler(&server.base_url, CrawlerInfo::default());
    let mut session = CrawlSession {
        web_id: Some("42".to_owned()),
        web_url: Some("stale".to_owned()),
    };

    let url = format!("{}/feeds/42/posts/default?alt=json&start-index=99", server.base_url);
    let contents = crawler.fetch_contents(&mut session, Some(&url), None).await;

    assert!(contents.is_empty());
    assert_eq!(session.web_url, None);
    assert_eq!(session.web_id.as_deref(), Some("42"));
}
