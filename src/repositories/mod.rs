pub mod passage_pinecone_repository;
pub mod request_log_postgres_repository;
