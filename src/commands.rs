use std::sync::Arc;

use async_trait::async_trait;
use poise::{serenity_prelude::CreateAttachment, CreateReply};
use rand::Rng;
use tracing::{error, info, warn};

use crate::{render::PriceCard, sources::PriceSource};

/// State shared by every command invocation.
pub struct Data {
    pub price: Arc<dyn PriceSource>,
    pub card: PriceCard,
    /// Only channel `/price` answers in.
    pub price_channel: u64,
    /// Only channel `/roll` answers in.
    pub roll_channel: u64,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// The slice of an interaction the handlers use.
#[async_trait]
pub trait Responder: Send + Sync {
    fn channel_id(&self) -> u64;
    /// Invoking user's name and id.
    fn user(&self) -> (String, u64);
    /// Reply only the invoking user can see.
    async fn reject(&self, text: String) -> Result<(), Error>;
    async fn defer(&self) -> Result<(), Error>;
    async fn reply(&self, text: String) -> Result<(), Error>;
    async fn reply_with_image(
        &self,
        text: String,
        image: Vec<u8>,
        file_name: String,
    ) -> Result<(), Error>;
}

/// Rejects the request privately unless it comes from `allowed`.
async fn gate(r: &dyn Responder, allowed: u64) -> Result<bool, Error> {
    if r.channel_id() == allowed {
        return Ok(true);
    }
    let text = format!("❌ This command is only available in the channel <#{allowed}>");
    r.reject(text).await?;
    Ok(false)
}

/// Uniform in `0..=100`.
pub fn roll_number(rng: &mut impl Rng) -> u8 {
    rng.gen_range(0..=100)
}

pub async fn handle_price(r: &dyn Responder, data: &Data) -> Result<(), Error> {
    if !gate(r, data.price_channel).await? {
        return Ok(());
    }
    if let Err(e) = data.card.check_assets() {
        warn!(command = "price", "{e}");
        r.reply(format!("❌ Failed to create image: {e}")).await?;
        return Ok(());
    }

    r.defer().await?;
    let price = data.price.fetch_price().await?;

    let card = data.card.clone();
    let image = match tokio::task::spawn_blocking(move || card.render(price)).await {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => {
            error!(command = "price", "Failed to render price card: {e}");
            r.reply("❌ Failed to create image.".to_owned()).await?;
            return Ok(());
        }
        Err(e) => {
            error!(command = "price", "Price card renderer crashed: {e}");
            r.reply("❌ Failed to create image.".to_owned()).await?;
            return Ok(());
        }
    };

    let text = format!("Current price $BTC: ${price:.2}");
    r.reply_with_image(text, image, data.card.file_name()).await?;
    info!(command = "price", %price, "Price command used");
    Ok(())
}

pub async fn handle_roll(
    r: &dyn Responder,
    allowed: u64,
    roll: impl FnOnce() -> u8 + Send,
) -> Result<(), Error> {
    if !gate(r, allowed).await? {
        return Ok(());
    }

    let number = roll();
    r.reply(format!("🎲 **{number}**")).await?;

    let (user, user_id) = r.user();
    info!(command = "roll", %user, user_id, result = number, "Roll command used");
    Ok(())
}

struct PoiseResponder<'a>(Context<'a>);

#[async_trait]
impl Responder for PoiseResponder<'_> {
    fn channel_id(&self) -> u64 {
        self.0.channel_id().get()
    }

    fn user(&self) -> (String, u64) {
        let author = self.0.author();
        (author.name.clone(), author.id.get())
    }

    async fn reject(&self, text: String) -> Result<(), Error> {
        self.0
            .send(CreateReply::default().content(text).ephemeral(true))
            .await?;
        Ok(())
    }

    async fn defer(&self) -> Result<(), Error> {
        self.0.defer().await?;
        Ok(())
    }

    async fn reply(&self, text: String) -> Result<(), Error> {
        self.0.say(text).await?;
        Ok(())
    }

    async fn reply_with_image(
        &self,
        text: String,
        image: Vec<u8>,
        file_name: String,
    ) -> Result<(), Error> {
        self.0
            .send(
                CreateReply::default()
                    .content(text)
                    .attachment(CreateAttachment::bytes(image, file_name)),
            )
            .await?;
        Ok(())
    }
}

/// Show current BTC price
#[poise::command(slash_command)]
pub async fn price(ctx: Context<'_>) -> Result<(), Error> {
    if let Err(e) = handle_price(&PoiseResponder(ctx), ctx.data()).await {
        error!(command = "price", "{e:#}");
    }
    Ok(())
}

/// Random number 0-100
#[poise::command(slash_command)]
pub async fn roll(ctx: Context<'_>) -> Result<(), Error> {
    let allowed = ctx.data().roll_channel;
    let res = handle_roll(&PoiseResponder(ctx), allowed, || {
        roll_number(&mut rand::thread_rng())
    })
    .await;
    if let Err(e) = res {
        error!(command = "roll", "{e:#}");
    }
    Ok(())
}

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![price(), roll()]
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use rand::{rngs::StdRng, SeedableRng};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::*;
    use crate::sources::coingecko::PriceError;

    const PRICE_CHANNEL: u64 = 1249289752998445109;
    const ROLL_CHANNEL: u64 = 1375863859616677980;
    const TEST_FONT: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/DejaVuSansMono-Bold.ttf"
    );

    struct Recorder {
        channel: u64,
        events: Mutex<Vec<String>>,
        images: Mutex<Vec<Vec<u8>>>,
    }

    impl Recorder {
        fn in_channel(channel: u64) -> Self {
            Self {
                channel,
                events: Mutex::new(Vec::new()),
                images: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Responder for Recorder {
        fn channel_id(&self) -> u64 {
            self.channel
        }
        fn user(&self) -> (String, u64) {
            ("tester".to_owned(), 7)
        }
        async fn reject(&self, text: String) -> Result<(), Error> {
            self.events.lock().unwrap().push(format!("private: {text}"));
            Ok(())
        }
        async fn defer(&self) -> Result<(), Error> {
            self.events.lock().unwrap().push("defer".to_owned());
            Ok(())
        }
        async fn reply(&self, text: String) -> Result<(), Error> {
            self.events.lock().unwrap().push(text);
            Ok(())
        }
        async fn reply_with_image(
            &self,
            text: String,
            image: Vec<u8>,
            file_name: String,
        ) -> Result<(), Error> {
            self.events.lock().unwrap().push(format!("{text} [{file_name}]"));
            self.images.lock().unwrap().push(image);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingPrice(AtomicUsize);

    #[async_trait]
    impl PriceSource for CountingPrice {
        async fn fetch_price(&self) -> Result<Decimal, PriceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Decimal::new(3000000, 2))
        }
    }

    fn data(dir: &TempDir, price: Arc<CountingPrice>) -> Data {
        Data {
            price,
            card: PriceCard::new(
                dir.path().join("background.jpg"),
                dir.path().join("font.ttf"),
                dir.path().join("out.jpg"),
            ),
            price_channel: PRICE_CHANNEL,
            roll_channel: ROLL_CHANNEL,
        }
    }

    #[tokio::test]
    async fn price_outside_allowed_channel_only_rejects() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(CountingPrice::default());
        let r = Recorder::in_channel(ROLL_CHANNEL);

        handle_price(&r, &data(&dir, source.clone())).await.unwrap();

        assert_eq!(
            r.events(),
            [format!(
                "private: ❌ This command is only available in the channel <#{PRICE_CHANNEL}>"
            )]
        );
        assert_eq!(source.0.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("out.jpg").exists());
    }

    #[tokio::test]
    async fn price_with_missing_assets_fails_visibly() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(CountingPrice::default());
        let r = Recorder::in_channel(PRICE_CHANNEL);

        handle_price(&r, &data(&dir, source.clone())).await.unwrap();

        let events = r.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("❌ Failed to create image: asset not found"));
        assert!(events[0].contains("background.jpg"));
        assert_eq!(source.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn price_defers_then_replies_with_card() {
        let dir = TempDir::new().unwrap();
        image::RgbImage::new(640, 400)
            .save(dir.path().join("background.jpg"))
            .unwrap();
        std::fs::copy(TEST_FONT, dir.path().join("font.ttf")).unwrap();
        let source = Arc::new(CountingPrice::default());
        let r = Recorder::in_channel(PRICE_CHANNEL);

        handle_price(&r, &data(&dir, source.clone())).await.unwrap();

        assert_eq!(r.events(), ["defer", "Current price $BTC: $30000.00 [out.jpg]"]);
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
        assert_eq!(r.images.lock().unwrap().len(), 1);
        let card = image::load_from_memory(&r.images.lock().unwrap()[0]).unwrap();
        assert_eq!((card.width(), card.height()), (640, 400));
    }

    #[tokio::test]
    async fn price_with_broken_font_reports_render_failure() {
        let dir = TempDir::new().unwrap();
        image::RgbaImage::new(8, 8)
            .save_with_format(dir.path().join("background.jpg"), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(dir.path().join("font.ttf"), b"garbage").unwrap();
        let source = Arc::new(CountingPrice::default());
        let r = Recorder::in_channel(PRICE_CHANNEL);

        handle_price(&r, &data(&dir, source.clone())).await.unwrap();

        assert_eq!(r.events(), ["defer", "❌ Failed to create image."]);
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn roll_outside_allowed_channel_only_rejects() {
        let r = Recorder::in_channel(PRICE_CHANNEL);
        let rolled = AtomicUsize::new(0);

        handle_roll(&r, ROLL_CHANNEL, || {
            rolled.fetch_add(1, Ordering::SeqCst);
            50
        })
        .await
        .unwrap();

        assert_eq!(
            r.events(),
            [format!(
                "private: ❌ This command is only available in the channel <#{ROLL_CHANNEL}>"
            )]
        );
        assert_eq!(rolled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn roll_replies_with_number() {
        let r = Recorder::in_channel(ROLL_CHANNEL);
        handle_roll(&r, ROLL_CHANNEL, || 42).await.unwrap();
        assert_eq!(r.events(), ["🎲 **42**"]);
    }

    #[test]
    fn roll_covers_inclusive_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 101];
        for _ in 0..20_000 {
            let n = roll_number(&mut rng);
            assert!(n <= 100);
            seen[n as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
