//! Stimulus asset pool.
//!
//! Cards come from an [`AssetProvider`]. The cached provider reads previously
//! generated images from sqlite and only calls the remote image model on a cold
//! cache. Any provider failure degrades to an empty pool, which makes the deck
//! fall back to synthesized cards.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};
use std::fs;
use std::path::Path;

use crate::config::ServiceConfig;
use crate::deck::{RandomSource, RngSource};
use crate::logging::{log, log_degraded, obj, ts_epoch_ms, v_int, v_str, Domain, Level};
use crate::stimulus::{Card, HeldObject, StimulusAttributes, ATTIRES, GENDERS, RACES};

pub mod cache;
pub mod remote;

use cache::{AssetCache, StoredAsset};
use remote::{extension_for, image_prompt, GenAiClient, GeneratedImage};

#[async_trait]
pub trait AssetProvider {
    async fn load_cards(&self) -> Result<Vec<Card>>;
}

/// Fixed pool, mostly for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticAssetProvider {
    cards: Vec<Card>,
}

impl StaticAssetProvider {
    pub fn new(cards: Vec<Card>) -> Self {
        Self { cards }
    }
}

#[async_trait]
impl AssetProvider for StaticAssetProvider {
    async fn load_cards(&self) -> Result<Vec<Card>> {
        Ok(self.cards.clone())
    }
}

/// Load the pool, or an empty one if the provider fails.
pub async fn load_pool(provider: &(dyn AssetProvider + Send + Sync)) -> Vec<Card> {
    match provider.load_cards().await {
        Ok(cards) => {
            log(
                Level::Info,
                Domain::Asset,
                "pool.loaded",
                obj(&[("cards", v_int(cards.len() as i64))]),
            );
            cards
        }
        Err(err) => {
            log_degraded(Domain::Asset, "asset pool", &format!("{:#}", err));
            Vec::new()
        }
    }
}

/// Per race: two gun holders, one smartphone, one wallet. Gender and attire random.
pub fn generation_plan<S: RandomSource>(source: &mut S) -> Vec<StimulusAttributes> {
    let mut plan = Vec::with_capacity(RACES.len() * 4);
    for race in RACES {
        for object in [HeldObject::Gun, HeldObject::Gun, HeldObject::Phone, HeldObject::Wallet] {
            let gender = *source.pick(&GENDERS);
            let attire = *source.pick(&ATTIRES);
            plan.push(StimulusAttributes::new(race, gender, attire, object));
        }
    }
    plan
}

/// Progress callback: (done, total, message).
pub type ProgressFn = Box<dyn Fn(usize, usize, &str) + Send + Sync>;

pub struct CachedAssetProvider {
    cfg: ServiceConfig,
    progress: Option<ProgressFn>,
}

impl CachedAssetProvider {
    pub fn new(cfg: ServiceConfig) -> Self {
        Self { cfg, progress: None }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, done: usize, total: usize, msg: &str) {
        if let Some(progress) = &self.progress {
            progress(done, total, msg);
        }
    }

    fn read_cache(&self) -> Vec<StoredAsset> {
        match AssetCache::open(&self.cfg.cache_path).and_then(|c| c.load_all()) {
            Ok(assets) => assets,
            Err(err) => {
                log_degraded(Domain::Asset, "asset cache read", &format!("{:#}", err));
                Vec::new()
            }
        }
    }

    fn write_cache(&self, assets: &[StoredAsset]) {
        if let Err(err) = AssetCache::open(&self.cfg.cache_path).and_then(|mut c| c.save(assets)) {
            log_degraded(Domain::Asset, "asset cache write", &format!("{:#}", err));
        }
    }

    async fn generate(&self, client: &GenAiClient) -> Vec<StoredAsset> {
        let mut source = RngSource(StdRng::from_entropy());
        let plan = generation_plan(&mut source);
        let total = plan.len();
        let mut generated = Vec::new();

        for (i, attrs) in plan.into_iter().enumerate() {
            self.report(
                i,
                total,
                &format!("Generating {} character ({})...", attrs.race(), attrs.held_object()),
            );
            match client.generate_image(&self.cfg.image_model, &image_prompt(&attrs)).await {
                Ok(GeneratedImage { mime_type, bytes }) => generated.push(StoredAsset {
                    id: format!("gen_{}_{}", i, ts_epoch_ms()),
                    attributes: attrs,
                    mime_type,
                    data: bytes,
                }),
                Err(err) => log(
                    Level::Warn,
                    Domain::Asset,
                    "asset.skipped",
                    obj(&[("index", v_int(i as i64)), ("error", v_str(&format!("{:#}", err)))]),
                ),
            }
        }
        generated
    }
}

#[async_trait]
impl AssetProvider for CachedAssetProvider {
    async fn load_cards(&self) -> Result<Vec<Card>> {
        let cached = self.read_cache();
        if !cached.is_empty() {
            self.report(cached.len(), cached.len(), "Loading assets from cache...");
            return materialize(&self.cfg.asset_dir, &cached);
        }

        let Some(client) = GenAiClient::from_config(&self.cfg)? else {
            bail!("API key missing");
        };
        let generated = self.generate(&client).await;
        log(
            Level::Info,
            Domain::Asset,
            "assets.generated",
            obj(&[("count", v_int(generated.len() as i64))]),
        );
        if !generated.is_empty() {
            self.report(generated.len(), generated.len(), "Saving assets to local storage...");
            self.write_cache(&generated);
        }
        materialize(&self.cfg.asset_dir, &generated)
    }
}

/// Write image files and return cards pointing at them.
pub fn materialize(dir: &Path, assets: &[StoredAsset]) -> Result<Vec<Card>> {
    if assets.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    assets
        .iter()
        .map(|asset| {
            let path = dir.join(format!("{}.{}", asset.id, extension_for(&asset.mime_type)));
            if !path.exists() {
                fs::write(&path, &asset.data).with_context(|| format!("write {}", path.display()))?;
            }
            Ok(Card::new(
                asset.id.clone(),
                asset.attributes,
                Some(path.to_string_lossy().into_owned()),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::SequenceSource;
    use crate::stimulus::{Attire, Gender, Race};
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FailingProvider;

    #[async_trait]
    impl AssetProvider for FailingProvider {
        async fn load_cards(&self) -> Result<Vec<Card>> {
            bail!("quota exhausted")
        }
    }

    fn offline_config(dir: &TempDir) -> ServiceConfig {
        let mut cfg = ServiceConfig::from_env().unwrap();
        cfg.api_key = None;
        cfg.cache_path = dir.path().join("assets.sqlite");
        cfg.asset_dir = dir.path().join("img");
        cfg
    }

    #[test]
    fn test_plan_has_sixteen_balanced_profiles() {
        let mut source = RngSource(StdRng::seed_from_u64(11));
        let plan = generation_plan(&mut source);
        assert_eq!(plan.len(), 16);

        let mut per_race: HashMap<Race, (usize, usize)> = HashMap::new();
        for a in &plan {
            let e = per_race.entry(a.race()).or_default();
            if a.is_threat() {
                e.0 += 1;
            } else {
                e.1 += 1;
            }
        }
        assert!(per_race.values().all(|&(t, s)| t == 2 && s == 2));
        assert!(plan.iter().any(|a| a.held_object() == HeldObject::Wallet));
        assert!(plan.iter().all(|a| a.held_object() != HeldObject::Camera));
    }

    #[test]
    fn test_plan_draws_gender_then_attire() {
        let mut source = SequenceSource::new(std::iter::repeat([1usize, 2]).take(16).flatten());
        let plan = generation_plan(&mut source);
        assert!(plan.iter().all(|a| a.gender() == Gender::Female && a.attire() == Attire::Uniform));
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn test_failing_provider_degrades_to_empty_pool() {
        assert!(load_pool(&FailingProvider).await.is_empty());
    }

    #[tokio::test]
    async fn test_cold_cache_without_key_fails() {
        let dir = TempDir::new().unwrap();
        let provider = CachedAssetProvider::new(offline_config(&dir));
        let err = provider.load_cards().await.unwrap_err();
        assert!(err.to_string().contains("API key missing"));
    }

    #[tokio::test]
    async fn test_warm_cache_needs_no_key() {
        let dir = TempDir::new().unwrap();
        let cfg = offline_config(&dir);
        let attrs = StimulusAttributes::new(Race::Asian, Gender::Male, Attire::Suit, HeldObject::Gun);
        AssetCache::open(&cfg.cache_path)
            .unwrap()
            .save(&[StoredAsset {
                id: "gen_0_1".into(),
                attributes: attrs,
                mime_type: "image/png".into(),
                data: vec![1, 2, 3],
            }])
            .unwrap();

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let provider = CachedAssetProvider::new(cfg.clone()).with_progress(Box::new(move |d, t, m| {
            sink.lock().unwrap().push((d, t, m.to_string()));
        }));
        let cards = provider.load_cards().await.unwrap();

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].attributes, attrs);
        let path = cards[0].visual.clone().unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert!(path.ends_with("gen_0_1.png"));
        assert_eq!(seen.lock().unwrap()[0].0, 1);
    }
}
