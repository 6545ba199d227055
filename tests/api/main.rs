mod ask_rag;
mod health_check;
mod helpers;
