use serde::Deserialize;

use crate::db::ArticleRow;

/// List envelope returned by `GET /api/articles`.
#[derive(Deserialize, Debug)]
pub struct ArticlesResp {
    #[serde(default)]
    pub articles: Vec<ArticleRow>,
}

/// Single-article envelope; some deployments wrap the row, others do not.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ArticleResp {
    Wrapped { article: ArticleRow },
    Bare(ArticleRow),
}

impl ArticleResp {
    pub fn into_row(self) -> ArticleRow {
        match self {
            ArticleResp::Wrapped { article } => article,
            ArticleResp::Bare(row) => row,
        }
    }
}
