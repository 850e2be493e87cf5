use crate::api::{ApiClient, UserLookup};
use crate::ranking::{self, DEFAULT_TIMELINE_COUNT, DEFAULT_TOP_K};
use crate::storage::{ContentItem, Database, DatabaseError, MergeOutcome, NewSource};

/// Accounts followed when the database starts out empty.
pub const DEFAULT_SEED_HANDLES: &[&str] = &[
    "DiogoBataguas",
    "DiogoBeja",
    "bifeahcasa",
    "danielcarapeto",
    "TiagoCCaetano",
    "ogajo_",
    "FernandaFreitas",
    "OPauloAlmeida",
    "JoannaAzevedo",
    "RitaDaNova",
    "raminhoseffect",
    "catarinamatos",
    "hugosousacomedy",
    "guilhermefon",
    "RuiHCruz",
    "cvazmarques",
    "RuiSinelCordes",
    "pmnribeiro",
    "fhf",
    "Manzarra",
    "SalvasMartinha",
    "O_Unas",
    "Corpodormente",
    "fernandoalvim",
    "JoseDePina",
];

#[derive(Debug, Clone, Copy)]
pub struct CurationSettings {
    /// Recent posts fetched per scan
    pub timeline_count: u32,
    /// Posts kept per scan
    pub top_k: usize,
}

impl Default for CurationSettings {
    fn default() -> Self {
        Self {
            timeline_count: DEFAULT_TIMELINE_COUNT,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// What one curation firing did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurationOutcome {
    /// No sources to scan yet
    NoSources,
    /// The timeline fetch failed; the source was still stamped as checked
    FetchFailed { handle: String },
    /// The ranked selection was merged
    Merged {
        handle: String,
        fetched: usize,
        outcome: MergeOutcome,
    },
}

/// Scans one source per firing and merges its best posts into the review set.
#[derive(Clone)]
pub struct Curator {
    db: Database,
    client: ApiClient,
    settings: CurationSettings,
}

impl Curator {
    pub fn new(db: Database, client: ApiClient, settings: CurationSettings) -> Self {
        Self {
            db,
            client,
            settings,
        }
    }

    /// One firing: pick the source checked longest ago, fetch, rank, merge.
    ///
    /// Platform failures are not errors here: the source is stamped as
    /// attempted so a single bad account cannot starve the others. Only
    /// storage failures propagate.
    pub async fn run_curation(&self) -> Result<CurationOutcome, DatabaseError> {
        let Some(source) = self.db.next_source_to_check().await? else {
            tracing::debug!("No sources to curate");
            return Ok(CurationOutcome::NoSources);
        };

        let now = chrono::Utc::now().timestamp();
        let posts = match self
            .client
            .user_timeline(&source.handle, self.settings.timeline_count)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                tracing::warn!(source = %source.handle, error = %e, "Timeline fetch failed");
                self.db.mark_source_attempted(source.id, now).await?;
                return Ok(CurationOutcome::FetchFailed {
                    handle: source.handle,
                });
            }
        };

        let fetched = posts.len();
        let items: Vec<ContentItem> = posts.into_iter().map(ContentItem::from).collect();
        let selected = ranking::select_top(items, self.settings.top_k);
        let outcome = self.db.merge_selection(source.id, &selected, now).await?;

        tracing::info!(
            source = %source.handle,
            fetched = fetched,
            inserted = outcome.inserted,
            refreshed = outcome.refreshed,
            untouched = outcome.untouched,
            "Curation complete"
        );

        Ok(CurationOutcome::Merged {
            handle: source.handle,
            fetched,
            outcome,
        })
    }

    /// Resolve `handles` through the batch lookup and store them as sources.
    ///
    /// A lookup failure is logged and yields `Ok(0)`; startup never blocks on it.
    pub async fn seed(&self, handles: &[String]) -> Result<usize, DatabaseError> {
        let users = match self.client.lookup_users(UserLookup::Handle, handles).await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(requested = handles.len(), error = %e, "Seed lookup failed");
                return Ok(0);
            }
        };

        let sources: Vec<NewSource> = users.into_iter().map(NewSource::from).collect();
        self.db.upsert_sources(&sources).await?;
        tracing::info!(
            requested = handles.len(),
            resolved = sources.len(),
            "Seeded sources"
        );
        Ok(sources.len())
    }

    /// [`Curator::seed`], but only when no source exists yet.
    pub async fn seed_if_empty(&self, handles: &[String]) -> Result<usize, DatabaseError> {
        if self.db.count_sources().await? > 0 {
            return Ok(0);
        }
        self.seed(handles).await
    }
}
