use crate::decoder::ImageFileDecoder;
use lumen_cache::{retained_cache, CacheStatistics, InMemoryRetainer};
use lumen_core::LoaderConfig;
use lumen_loader::{
    DispatchMode, Dispatcher, DispatcherStatistics, EventLoop, ImageCreator, ProcessedImage,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct LoadOptions {
    pub fade: bool,
    pub plain: bool,
    pub stats: bool,
}

#[derive(Serialize)]
struct Report {
    cache: CacheStatistics,
    dispatcher: DispatcherStatistics,
}

pub async fn execute(
    config: &LoaderConfig,
    locators: Vec<String>,
    options: LoadOptions,
) -> eyre::Result<()> {
    let retainer = InMemoryRetainer::new();
    let cache = retained_cache(&retainer, config).await?;
    let dispatcher = Dispatcher::new(cache, Arc::new(ImageFileDecoder), config)?;

    // The main task plays the UI thread: context deliveries run here
    let mut event_loop = EventLoop::new();
    let context = event_loop.handle();
    dispatcher.container_created(&context)?;

    let creator = if options.fade {
        ImageCreator::CompositeFade
    } else {
        ImageCreator::Identity
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    for (index, raw) in locators.iter().enumerate() {
        let tx = tx.clone();
        let mode = if options.plain {
            DispatchMode::Plain
        } else {
            DispatchMode::Context(context.clone())
        };
        dispatcher.load(
            raw.as_str(),
            move |result: Option<ProcessedImage>| {
                let _ = tx.send((index, result));
            },
            creator,
            mode,
        )?;
    }
    drop(tx);

    let mut results: Vec<Option<ProcessedImage>> = vec![None; locators.len()];
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some((index, result)) => results[index] = result,
                // Every receiver has run or been dropped
                None => break,
            },
            _ = event_loop.turn(), if !options.plain => {}
        }
    }

    let mut failures = 0;
    for (raw, result) in locators.iter().zip(&results) {
        match result {
            Some(processed) => println!("{raw}: {}", describe(processed)),
            None => {
                failures += 1;
                println!("{raw}: failed");
            }
        }
    }

    if options.stats {
        let report = Report {
            cache: dispatcher.cache().statistics(),
            dispatcher: dispatcher.statistics(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    dispatcher.container_destroyed(&context);
    dispatcher.shutdown();

    if failures > 0 {
        eyre::bail!("{failures} of {} images failed to load", locators.len());
    }
    Ok(())
}

fn describe(processed: &ProcessedImage) -> String {
    let image = processed.image();
    let base = format!("{}x{} {:?}", image.width(), image.height(), image.format());
    match processed {
        ProcessedImage::Plain(_) => base,
        ProcessedImage::Drawable(_) => format!("{base} (drawable)"),
        ProcessedImage::Transition(transition) => {
            format!("{base} (fade-in {} ms)", transition.duration.as_millis())
        }
    }
}
