//! Builder Module
//!
//! Fluent Builder APIを提供し、`Package`の読み込み設定を段階的に構築する。

use serde::{Deserialize, Serialize};

use crate::api::{Compression, DateFormat, LeadingZeros};
use crate::error::XlsxCloneError;
use crate::package::Package;
use crate::security::SecurityConfig;

/// パッケージ操作の設定
///
/// すべてのフィールドにデフォルト値があり、設定ファイルなどから部分的に
/// デシリアライズできます。
///
/// # 使用例
///
/// ```rust
/// use xlsxclone::{LeadingZeros, PackageConfig};
///
/// let config: PackageConfig = serde_json::from_str(r#"{"leading_zeros": "Text"}"#).unwrap();
/// assert_eq!(config.leading_zeros, LeadingZeros::Text);
/// assert!(config.clear_tab_selection_on_clone);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// 先頭ゼロ付きの数値文字列の扱い
    pub leading_zeros: LeadingZeros,

    /// 日付セルの出力形式
    pub date_format: DateFormat,

    /// 複製したシートのタブ選択状態を外すか
    pub clear_tab_selection_on_clone: bool,

    /// 書き換えたパートの圧縮方式
    pub compression: Compression,

    /// 読み込み時のセキュリティ制限
    pub security: SecurityConfig,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            leading_zeros: LeadingZeros::Numeric,
            date_format: DateFormat::Slashed,
            clear_tab_selection_on_clone: true,
            compression: Compression::Deflated,
            security: SecurityConfig::default(),
        }
    }
}

impl PackageConfig {
    pub(crate) fn validate(&self) -> Result<(), XlsxCloneError> {
        self.date_format.validate()?;

        let security = &self.security;
        if security.max_file_count == 0 {
            return Err(XlsxCloneError::Config(
                "max_file_count must be greater than 0".to_string(),
            ));
        }
        if security.max_file_size > security.max_decompressed_size {
            return Err(XlsxCloneError::Config(format!(
                "max_file_size ({}) exceeds max_decompressed_size ({})",
                security.max_file_size, security.max_decompressed_size
            )));
        }
        Ok(())
    }
}

/// Fluent Builder APIを提供する構造体
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxclone::{DateFormat, LeadingZeros, PackageBuilder};
///
/// # fn main() -> Result<(), xlsxclone::XlsxCloneError> {
/// let template = std::fs::read("template.xlsx")?;
/// let package = PackageBuilder::new()
///     .with_leading_zeros(LeadingZeros::Text)
///     .with_date_format(DateFormat::Iso8601)
///     .load(&template)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PackageBuilder {
    config: PackageConfig,
}

impl PackageBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - 先頭ゼロ: 数値として書き込む
    /// - 日付形式: YYYY/MM/DD
    /// - 複製時のタブ選択解除: 有効
    /// - 圧縮: Deflate
    pub fn new() -> Self {
        Self {
            config: PackageConfig::default(),
        }
    }

    /// 先頭ゼロ付きの数値文字列の扱いを指定する
    pub fn with_leading_zeros(mut self, leading_zeros: LeadingZeros) -> Self {
        self.config.leading_zeros = leading_zeros;
        self
    }

    /// 日付の出力形式を指定する
    ///
    /// # 使用例
    ///
    /// ```rust
    /// use xlsxclone::{DateFormat, PackageBuilder};
    ///
    /// let builder = PackageBuilder::new()
    ///     .with_date_format(DateFormat::Custom("%Y年%m月%d日".to_string()));
    /// ```
    pub fn with_date_format(mut self, format: DateFormat) -> Self {
        self.config.date_format = format;
        self
    }

    /// 複製したシートのタブ選択状態を外すかを指定する
    ///
    /// * `true`: `tabSelected="1"`を取り除く（デフォルト）
    /// * `false`: 複製元のシートビューをそのまま使う
    pub fn clear_tab_selection_on_clone(mut self, clear: bool) -> Self {
        self.config.clear_tab_selection_on_clone = clear;
        self
    }

    /// 書き換えたパートの圧縮方式を指定する
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// 設定をまとめて置き換える
    pub fn with_config(mut self, config: PackageConfig) -> Self {
        self.config = config;
        self
    }

    /// 設定を検証し、`PackageConfig`を返す
    ///
    /// # 発生し得るエラー
    ///
    /// * `XlsxCloneError::Config(String)`: 設定の検証に失敗した場合
    ///   * カスタム日付形式が不正な書式文字列
    ///   * セキュリティ制限の組み合わせが矛盾している
    pub fn build(self) -> Result<PackageConfig, XlsxCloneError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// 設定を検証し、テンプレートパッケージを読み込む
    pub fn load(self, bytes: &[u8]) -> Result<Package, XlsxCloneError> {
        let config = self.build()?;
        Package::load_with_config(bytes, config)
    }
}
