use std::fs;
use std::path::Path;
use std::sync::Arc;

use medical_rag::config::{IdScheme, RetrievalConfig};
use medical_rag::embedding::{EmbeddingProvider, HashProvider};
use medical_rag::error::Error;
use medical_rag::index::{CollectionSpec, MemoryIndex, SqliteIndex, VectorIndex};
use medical_rag::ingest::{build_from_dir, Ingestor};
use medical_rag::jsonl::{load_documents, save_documents, DocumentRecord};
use medical_rag::models::Point;
use medical_rag::retrieval::{HybridAdapter, KnowledgeSource, VectorAdapter};
use tempfile::TempDir;

const DIMS: usize = 384;

const SYMPTOMS_CSV: &str = "\
Disease,Symptom_1,Symptom_2,Symptom_3,Symptom_4
Fungal infection,itching,skin_rash,nodal_skin_eruptions,
Heart attack,vomiting,breathlessness,sweating,chest_pain
Common Cold,continuous_sneezing,chills,fatigue,cough
Migraine,acidity,indigestion,headache,blurred_and_distorted_vision
Jaundice,itching,vomiting,fatigue,weight_loss
Malaria,chills,vomiting,high_fever,sweating
Allergy,continuous_sneezing,shivering,chills,watering_from_eyes
";

const PRECAUTIONS_CSV: &str = "\
Disease,Precaution_1,Precaution_2,Precaution_3,Precaution_4
Fungal infection,bath twice,use detol or neem in bathing water,keep infected area dry,use clean cloths
Heart attack,call ambulance,chew or swallow asprin,keep calm,
Common Cold,drink vitamin c rich drinks,take vapour,avoid cold food,keep fever in check
";

fn write_data(dir: &Path, with_precautions: bool) {
    fs::write(dir.join("dataset.csv"), SYMPTOMS_CSV).unwrap();
    if with_precautions {
        fs::write(dir.join("symptom_precaution.csv"), PRECAUTIONS_CSV).unwrap();
    }
}

fn records_from(dir: &Path) -> Vec<DocumentRecord> {
    build_from_dir(dir)
        .unwrap()
        .iter()
        .map(DocumentRecord::from)
        .collect()
}

fn provider() -> Arc<HashProvider> {
    Arc::new(HashProvider::new(DIMS))
}

async fn memory_pipeline(records: &[DocumentRecord]) -> (Arc<MemoryIndex>, VectorAdapter) {
    let provider = provider();
    let index = Arc::new(MemoryIndex::new("medical_diseases"));
    Ingestor::new(provider.clone(), index.clone(), 64, IdScheme::Position)
        .ingest(records)
        .await
        .unwrap();
    let adapter = VectorAdapter::new(index.clone(), provider, 5);
    (index, adapter)
}

#[test]
fn test_role_detection_builds_expected_document() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("a_symptoms.csv"),
        "Disease,Symptom_1,Symptom_2\nFungal infection,itching,skin_rash\n",
    )
    .unwrap();
    fs::write(
        tmp.path().join("b_precautions.csv"),
        "Disease,Precaution_1,Precaution_2\nFungal infection,bath twice,use detol\n",
    )
    .unwrap();

    let docs = build_from_dir(tmp.path()).unwrap();
    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert_eq!(doc.metadata.disease, "Fungal infection");
    assert_eq!(doc.symptoms, vec!["itching", "skin_rash"]);
    assert_eq!(doc.precautions, vec!["bath twice", "use detol"]);
    assert_eq!(doc.metadata.source, "a_symptoms.csv");
    assert!(doc.content.contains("- bath twice\n- use detol"));
}

#[test]
fn test_missing_precaution_file_uses_placeholders() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), false);

    let docs = build_from_dir(tmp.path()).unwrap();
    assert_eq!(docs.len(), 7);
    for doc in &docs {
        assert_eq!(doc.metadata.precaution_count, 0);
        assert!(doc.content.contains("- No precautions listed"));
    }
}

#[test]
fn test_disease_without_precautions_gets_placeholder() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), true);

    let docs = build_from_dir(tmp.path()).unwrap();
    let migraine = docs
        .iter()
        .find(|d| d.metadata.disease == "Migraine")
        .unwrap();
    assert_eq!(migraine.metadata.precaution_count, 0);
    assert!(migraine.content.contains("- No precautions listed"));

    let heart = docs
        .iter()
        .find(|d| d.metadata.disease == "Heart attack")
        .unwrap();
    assert_eq!(heart.precautions.len(), 3);
}

#[test]
fn test_no_symptom_table_is_schema_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("prec.csv"), PRECAUTIONS_CSV).unwrap();
    assert!(matches!(
        build_from_dir(tmp.path()),
        Err(Error::SchemaNotFound { .. })
    ));
}

#[test]
fn test_empty_directory_is_missing_source() {
    let tmp = TempDir::new().unwrap();
    assert!(matches!(
        build_from_dir(tmp.path()),
        Err(Error::MissingSource(_))
    ));
}

#[test]
fn test_jsonl_round_trip_from_built_documents() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), true);
    let docs = build_from_dir(tmp.path()).unwrap();

    let path = tmp.path().join("out").join("documents.jsonl");
    save_documents(&docs, &path).unwrap();
    let loaded = load_documents(&path).unwrap();

    assert_eq!(loaded.len(), docs.len());
    for (doc, record) in docs.iter().zip(&loaded) {
        assert_eq!(record.page_content, doc.content);
        assert_eq!(record.metadata, doc.metadata);
    }
}

#[tokio::test]
async fn test_query_ranks_matching_disease_first() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), true);
    let (_index, adapter) = memory_pipeline(&records_from(tmp.path())).await;

    let results = adapter.search("itching skin rash", 3).await.unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].metadata["disease"], "Fungal infection");
    assert!(results[0].content.starts_with("# Disease: Fungal infection"));
}

#[tokio::test]
async fn test_disease_name_query_ranks_it_first() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), true);
    let records = records_from(tmp.path());

    let (_index, adapter) = memory_pipeline(&records).await;
    let results = adapter
        .search("symptoms of fungal infection", 2)
        .await
        .unwrap();
    assert_eq!(results[0].metadata["disease"], "Fungal infection");

    let index = Arc::new(
        SqliteIndex::open(
            &tmp.path().join("index.sqlite"),
            "medical_diseases",
            &RetrievalConfig::default(),
        )
        .await
        .unwrap(),
    );
    Ingestor::new(provider(), index.clone(), 64, IdScheme::Position)
        .ingest(&records)
        .await
        .unwrap();
    let hybrid = HybridAdapter::new(index.clone(), provider(), 5);
    let results = hybrid
        .search("symptoms of fungal infection", 2)
        .await
        .unwrap();
    assert_eq!(results[0].metadata["disease"], "Fungal infection");
    index.close().await;
}

#[tokio::test]
async fn test_ingest_without_precaution_file() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), false);
    let records = records_from(tmp.path());

    let (index, adapter) = memory_pipeline(&records).await;
    assert_eq!(index.len(), 7);

    let results = adapter.search("chills vomiting high fever", 3).await.unwrap();
    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.metadata["precaution_count"], 0);
        assert!(result.content.contains("- No precautions listed"));
    }
}

#[tokio::test]
async fn test_zero_max_results_behaves_like_default() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), true);
    let (_index, adapter) = memory_pipeline(&records_from(tmp.path())).await;

    let zero = adapter.search("chills vomiting", 0).await.unwrap();
    let default = adapter.search("chills vomiting", 5).await.unwrap();
    assert_eq!(zero.len(), 5);
    assert_eq!(zero, default);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), true);
    let records = records_from(tmp.path());
    let (index, adapter) = memory_pipeline(&records).await;

    Ingestor::new(provider(), index.clone(), 3, IdScheme::Position)
        .ingest(&records)
        .await
        .unwrap();
    assert_eq!(index.len(), records.len());

    let results = adapter.search("itching skin rash", 10).await.unwrap();
    let fungal = results
        .iter()
        .filter(|r| r.metadata["disease"] == "Fungal infection")
        .count();
    assert_eq!(fungal, 1);
}

#[tokio::test]
async fn test_dimension_invariant() {
    let index = Arc::new(MemoryIndex::new("medical_diseases"));
    index
        .ensure_collection(&CollectionSpec::cosine("medical_diseases", DIMS))
        .await
        .unwrap();

    let wrong = Point {
        id: 0,
        vector: vec![0.1; DIMS - 1],
        payload: Default::default(),
    };
    assert!(matches!(
        index.upsert(&[wrong]).await,
        Err(Error::DimensionMismatch { .. })
    ));

    // a provider of another size cannot reuse the collection
    let small = Ingestor::new(
        Arc::new(HashProvider::new(64)),
        index.clone(),
        64,
        IdScheme::Position,
    );
    assert!(matches!(
        small.init().await,
        Err(Error::CollectionConflict { .. })
    ));
}

#[tokio::test]
async fn test_content_hash_ids_ignore_input_order() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), true);
    let records = records_from(tmp.path());
    let mut reversed = records.clone();
    reversed.reverse();

    let forward = Arc::new(MemoryIndex::new("c"));
    let backward = Arc::new(MemoryIndex::new("c"));
    for (index, input) in [(&forward, &records), (&backward, &reversed)] {
        Ingestor::new(provider(), index.clone(), 2, IdScheme::ContentHash)
            .ingest(input)
            .await
            .unwrap();
    }

    let query = HashProvider::new(DIMS).embed("high fever chills").await.unwrap();
    let a = forward.search(&query, 10).await.unwrap();
    let b = backward.search(&query, 10).await.unwrap();
    let ids_a: Vec<u64> = a.iter().map(|h| h.id).collect();
    let ids_b: Vec<u64> = b.iter().map(|h| h.id).collect();
    assert_eq!(ids_a, ids_b);
    assert_eq!(ids_a.len(), records.len());
}

#[tokio::test]
async fn test_hybrid_backend_end_to_end() {
    let tmp = TempDir::new().unwrap();
    write_data(tmp.path(), true);
    let records = records_from(tmp.path());

    let provider = provider();
    let index = Arc::new(
        SqliteIndex::open(
            &tmp.path().join("index.sqlite"),
            "medical_diseases",
            &RetrievalConfig::default(),
        )
        .await
        .unwrap(),
    );
    Ingestor::new(provider.clone(), index.clone(), 4, IdScheme::Position)
        .ingest(&records)
        .await
        .unwrap();
    assert_eq!(index.count().await.unwrap(), records.len() as u64);

    let adapter = HybridAdapter::new(index.clone(), provider, 5);
    let results = adapter.search("itching skin rash", 3).await.unwrap();
    assert_eq!(results[0].metadata["disease"], "Fungal infection");
    assert!(results[0].score.unwrap() <= 1.0);

    assert!(adapter.search("", 3).await.unwrap().is_empty());
    assert_eq!(adapter.search("fatigue", -1).await.unwrap().len(), 5);

    index.close().await;
}
