//! 機械学習モデルの共通定義
//!
//! 画像分類用の全結合ネットワークと前処理を提供します。

use anyhow::{Context, Result};
use burn::{
    config::Config,
    module::Module,
    nn::{loss::CrossEntropyLossConfig, Linear, LinearConfig, Relu},
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use image::{imageops::FilterType, RgbImage};
use std::path::Path;

/// 入力画像の高さ
pub const IMAGE_HEIGHT: usize = 100;

/// 入力画像の幅
pub const IMAGE_WIDTH: usize = 100;

/// チャネル数（RGB）
pub const NUM_CHANNELS: usize = 3;

/// 隠れ層のユニット数
pub const HIDDEN_UNITS: usize = 128;

/// モデル設定
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 隠れ層のユニット数
    #[config(default = 128)]
    pub hidden_units: usize,
    /// 入力画像の高さ
    #[config(default = 100)]
    pub image_height: usize,
    /// 入力画像の幅
    #[config(default = 100)]
    pub image_width: usize,
}

impl ClassifierConfig {
    /// Flatten後の特徴次元
    pub fn input_features(&self) -> usize {
        NUM_CHANNELS * self.image_height * self.image_width
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageClassifier<B> {
        let d = self.input_features();

        tracing::debug!(
            "[Model] 入力: {}x{}x{} -> Flatten {} -> FC {} -> FC {}",
            NUM_CHANNELS,
            self.image_height,
            self.image_width,
            d,
            self.hidden_units,
            self.num_classes
        );

        ImageClassifier {
            fc1: LinearConfig::new(d, self.hidden_units).init(device),
            fc2: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

/// 画像分類モデル
///
/// # アーキテクチャ
/// - Flatten: [batch, 3, H, W] -> [batch, 3*H*W]
/// - FC: 3*H*W -> hidden + ReLU
/// - FC: hidden -> num_classes
/// - Softmax (分類時)
#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    fc1: Linear<B>, // d -> hidden
    fc2: Linear<B>, // hidden -> num_classes
    activation: Relu,
}

impl<B: Backend> ImageClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, H, W]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.flatten::<2>(1, 3);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 予測を実行
    ///
    /// # 戻り値
    /// - (予測クラスID [batch_size, 1], 確率)
    pub fn predict(&self, images: Tensor<B, 4>) -> (Tensor<B, 2, Int>, Tensor<B, 2>) {
        let probabilities = self.forward_probabilities(images);
        let predictions = probabilities.clone().argmax(1);
        (predictions, probabilities)
    }

    /// 重みの形状が設定と一致するかを検証
    ///
    /// `load_record` は記録されたテンソルの形状をそのまま採用するため、読み込み後に確認する。
    pub fn check_config(&self, config: &ClassifierConfig) -> Result<()> {
        // Linearの重みは [d_input, d_output]
        let [fc1_in, fc1_out] = self.fc1.weight.val().dims();
        let [fc2_in, fc2_out] = self.fc2.weight.val().dims();

        let expected = [
            config.input_features(),
            config.hidden_units,
            config.hidden_units,
            config.num_classes,
        ];
        if [fc1_in, fc1_out, fc2_in, fc2_out] != expected {
            anyhow::bail!(
                "model weights do not match metadata: fc1 {}x{}, fc2 {}x{} (expected fc1 {}x{}, fc2 {}x{})",
                fc1_in,
                fc1_out,
                fc2_in,
                fc2_out,
                expected[0],
                expected[1],
                expected[2],
                expected[3]
            );
        }
        Ok(())
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// ロジットに対するクロスエントロピー。softmax出力 + sparse categorical
    /// cross-entropy と同じ値になる。
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

/// 画像を読み込んでRGBに変換
///
/// アルファチャネルやグレースケールは3チャネルRGBに揃える。
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("Failed to load image: {}", path.display()))?;
    Ok(img.to_rgb8())
}

/// リサイズして [0, 1] に正規化
///
/// # 戻り値
/// - 正規化されたRGB画像データ (C, H, W) の順で平坦化
pub fn preprocess_image(img: &RgbImage, height: usize, width: usize) -> Vec<f32> {
    let resized;
    let img = if img.dimensions() == (width as u32, height as u32) {
        img
    } else {
        // バイリニア補間
        resized = image::imageops::resize(img, width as u32, height as u32, FilterType::Triangle);
        &resized
    };

    let mut data = Vec::with_capacity(NUM_CHANNELS * height * width);
    for channel in 0..NUM_CHANNELS {
        for y in 0..height as u32 {
            for x in 0..width as u32 {
                let pixel = img.get_pixel(x, y);
                data.push(pixel[channel] as f32 / 255.0);
            }
        }
    }

    data
}

/// 画像を読み込んで前処理
pub fn load_and_preprocess_image(path: &Path, height: usize, width: usize) -> Result<Vec<f32>> {
    let img = load_image(path)?;
    Ok(preprocess_image(&img, height, width))
}
