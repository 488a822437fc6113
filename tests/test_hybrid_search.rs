//! Integration tests for hybrid search: determinism, fusion behaviour, and
//! filter handling over a real (temp-dir) SQLite index.

use tempfile::TempDir;

use paperbot::search::embeddings::HashedEmbeddings;
use paperbot::search::store::{NewChunk, PaperFilters, PaperRecord};
use paperbot::search::{EmbeddingsClient, HybridSearch, PaperStore};

const DIM: usize = 128;

// ── helpers ──────────────────────────────────────────────────────────────────

fn make_search() -> (TempDir, HybridSearch) {
    let tmp = TempDir::new().expect("tempdir");
    let store = PaperStore::open(&tmp.path().join("papers.db"), DIM).expect("open store");
    let search = HybridSearch::new(store, EmbeddingsClient::Hashed(HashedEmbeddings::new(DIM)));
    (tmp, search)
}

fn paper(arxiv_id: &str, categories: &[&str], published: &str) -> PaperRecord {
    PaperRecord {
        arxiv_id: arxiv_id.into(),
        title: format!("Paper {arxiv_id}"),
        authors: vec!["First Author".into(), "Second Author".into()],
        abstract_text: String::new(),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        published_date: Some(published.into()),
        pdf_url: Some(format!("https://arxiv.org/pdf/{arxiv_id}.pdf")),
        raw_text: String::new(),
        sections: Vec::new(),
    }
}

fn index(search: &HybridSearch, paper: &PaperRecord, texts: &[&str]) {
    search.store().upsert_paper(paper).expect("upsert");
    let embedder = HashedEmbeddings::new(DIM);
    let chunks: Vec<NewChunk> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| NewChunk {
            chunk_index: i as u32,
            chunk_text: t.to_string(),
            section_name: None,
            page_number: Some(i as u32 + 1),
            embedding: embedder.embed_one(t),
        })
        .collect();
    search.store().insert_chunks(&paper.arxiv_id, &chunks).expect("index chunks");
}

// ── determinism ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_searches_are_identical_including_scores() {
    let (_tmp, search) = make_search();
    index(
        &search,
        &paper("1706.03762", &["cs.CL"], "2017-06-12"),
        &[
            "scaled dot product attention is all you need",
            "multi head attention runs several attention layers in parallel",
            "positional encodings inject order information",
        ],
    );
    index(
        &search,
        &paper("1810.04805", &["cs.CL"], "2018-10-11"),
        &["bidirectional encoder representations from transformers"],
    );

    let a = search
        .search("attention layers", 4, &PaperFilters::default())
        .await
        .expect("first search");
    let b = search
        .search("attention layers", 4, &PaperFilters::default())
        .await
        .expect("second search");

    let ka: Vec<(i64, String, f64)> =
        a.iter().map(|h| (h.chunk_id, h.arxiv_id.clone(), h.score)).collect();
    let kb: Vec<(i64, String, f64)> =
        b.iter().map(|h| (h.chunk_id, h.arxiv_id.clone(), h.score)).collect();
    assert_eq!(ka, kb, "identical inputs on an unchanged index must match exactly");
}

// ── fusion ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lexical_and_vector_agreement_ranks_first() {
    let (_tmp, search) = make_search();
    // One chunk matches the query in both branches, one only vaguely.
    index(
        &search,
        &paper("a.1", &["cs.LG"], "2020-01-01"),
        &[
            "gradient descent optimizes neural network weights",
            "cooking pasta requires boiling water",
        ],
    );

    let hits = search
        .search("gradient descent neural network", 2, &PaperFilters::default())
        .await
        .expect("search");
    assert!(!hits.is_empty());
    assert!(hits[0].chunk_text.contains("gradient descent"));
    assert!((hits[0].score - 1.0).abs() < 1e-12, "top hit is normalised to 1.0");
}

#[tokio::test]
async fn growing_top_k_never_reorders_the_prefix() {
    let (_tmp, search) = make_search();
    index(
        &search,
        &paper("a.1", &["cs.LG"], "2020-01-01"),
        &[
            "attention weights softmax",
            "attention scores dot product",
            "attention heads parallel",
            "dropout regularization",
            "batch normalization layers",
        ],
    );

    let mut previous: Option<Vec<i64>> = None;
    for top_k in 1..=5 {
        let hits = search
            .search("attention", top_k, &PaperFilters::default())
            .await
            .expect("search");
        let ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
        if let Some(prev) = &previous {
            assert_eq!(
                &ids[..prev.len().min(ids.len())],
                &prev[..prev.len().min(ids.len())],
                "top_k={top_k} changed the established prefix"
            );
        }
        previous = Some(ids);
    }
}

#[tokio::test]
async fn scores_stay_within_unit_interval() {
    let (_tmp, search) = make_search();
    index(
        &search,
        &paper("a.1", &[], "2020-01-01"),
        &["transformers", "attention", "encoders", "decoders"],
    );
    let hits = search
        .search("transformers attention", 4, &PaperFilters::default())
        .await
        .expect("search");
    for h in &hits {
        assert!(h.score > 0.0 && h.score <= 1.0, "score {} out of range", h.score);
    }
    // Descending order.
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

// ── filters ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn date_range_filter_excludes_papers() {
    let (_tmp, search) = make_search();
    index(&search, &paper("old.1", &["cs.CL"], "2015-01-01"), &["attention early work"]);
    index(&search, &paper("new.2", &["cs.CL"], "2021-01-01"), &["attention recent work"]);

    let filters = PaperFilters {
        published_from: Some("2018-01-01".into()),
        ..Default::default()
    };
    let hits = search.search("attention", 5, &filters).await.expect("search");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.arxiv_id == "new.2"));
}

#[tokio::test]
async fn category_filter_applies_to_both_branches() {
    let (_tmp, search) = make_search();
    index(&search, &paper("cl.1", &["cs.CL"], "2020-01-01"), &["attention for language"]);
    index(&search, &paper("cv.2", &["cs.CV"], "2020-01-01"), &["attention for vision"]);

    let filters = PaperFilters {
        categories: Some(vec!["cs.CV".into()]),
        ..Default::default()
    };
    let hits = search.search("attention", 5, &filters).await.expect("search");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.arxiv_id == "cv.2"));
}

#[tokio::test]
async fn hit_carries_paper_metadata_for_sources() {
    let (_tmp, search) = make_search();
    index(
        &search,
        &paper("1706.03762", &["cs.CL"], "2017-06-12"),
        &["attention is all you need"],
    );
    let hits = search
        .search("attention", 1, &PaperFilters::default())
        .await
        .expect("search");
    let hit = &hits[0];
    assert_eq!(hit.title, "Paper 1706.03762");
    assert_eq!(hit.authors.len(), 2);
    assert_eq!(hit.published_date.as_deref(), Some("2017-06-12"));
    assert!(hit.pdf_url.as_deref().unwrap().contains("1706.03762"));
    assert_eq!(hit.page_number, Some(1));
}

// ── paper listing ────────────────────────────────────────────────────────────

#[test]
fn list_papers_paginates_with_total() {
    let (_tmp, search) = make_search();
    for i in 0..5 {
        index(
            &search,
            &paper(&format!("p.{i}"), &["cs.LG"], &format!("2020-01-0{}", i + 1)),
            &["text"],
        );
    }

    let (page, total) = search
        .list_papers(&PaperFilters::default(), 2, 2)
        .expect("list");
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);
    // Newest first: offsets walk backwards through publish dates.
    assert_eq!(page[0].arxiv_id, "p.2");
    assert_eq!(page[0].chunk_count, 1);
}
