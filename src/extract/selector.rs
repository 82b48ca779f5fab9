//! Declarative extractor driven by the `[extract]` table

use crate::config::{Category, ExtractConfig, FieldSelector};
use crate::driver::{parse, resolve_link, Document, ParserEngine};
use crate::extract::{ProductContext, ProductRef, Row, SiteExtractor, Value};
use crate::retry::{contains, retry_while};
use crate::{ConfigError, HarvestError, Result};
use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use url::Url;

/// Field holding the option text of a row
pub const OPTION_FIELD: &str = "option1";

/// Extractor configured with CSS selectors
///
/// Every row carries `product_id` and `product_url`, one entry per
/// configured field, and `option1` when the product lists options.
pub struct SelectorExtractor {
    config: ExtractConfig,
    id_pattern: Option<Regex>,
}

impl SelectorExtractor {
    pub fn new(config: ExtractConfig) -> std::result::Result<Self, ConfigError> {
        let id_pattern = config
            .id_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("invalid id-pattern: {}", e)))?;

        Ok(Self { config, id_pattern })
    }

    /// Product id of a product URL: the first id-pattern group, or the URL
    pub fn id_from_url(&self, url: &str) -> String {
        self.id_pattern
            .as_ref()
            .and_then(|re| re.captures(url))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| url.to_string())
    }

    /// Reads one field from a document
    fn field_value(&self, doc: &dyn Document, field: &FieldSelector) -> Result<Value> {
        let element = match doc.query_one(&field.selector) {
            Ok(element) => element,
            Err(HarvestError::NotFound { .. }) if field.optional => {
                return Ok(Value::Text(String::new()))
            }
            Err(e) => return Err(e),
        };
        self.element_value(doc, &element, field)
    }

    fn element_value(
        &self,
        doc: &dyn Document,
        element: &crate::driver::Element,
        field: &FieldSelector,
    ) -> Result<Value> {
        let raw = match &field.attr {
            Some(attr) => match doc.attribute_of(element, attr) {
                Some(value) => value,
                None if field.optional => String::new(),
                None => {
                    return Err(HarvestError::not_found(
                        format!("attribute '{}' of {}", attr, field.name),
                        doc.url(),
                    ))
                }
            },
            None => doc.text_of(element),
        };

        if !field.integer {
            return Ok(Value::Text(raw.trim().to_string()));
        }

        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        match digits.parse::<i64>() {
            Ok(n) => Ok(Value::Int(n)),
            Err(_) if field.optional && digits.is_empty() => Ok(Value::Text(String::new())),
            Err(_) => Err(HarvestError::not_found(
                format!("integer for {} (got '{}')", field.name, raw.trim()),
                doc.url(),
            )),
        }
    }

    /// Builds the rows of one product page
    fn rows_from(
        &self,
        url: &str,
        content: &[u8],
        engine: ParserEngine,
        product: &ProductRef,
    ) -> Result<Vec<Row>> {
        let doc = parse(url, content, engine)?;

        let mut base = Row::new()
            .with("product_id", product.id.as_str())
            .with("product_url", product.url.as_str());

        let mut per_option = Vec::new();
        for field in &self.config.field {
            if field.per_option {
                let values = doc
                    .query(&field.selector)?
                    .iter()
                    .map(|element| self.element_value(&doc, element, field))
                    .collect::<Result<Vec<_>>>()?;
                per_option.push((field, values));
            } else {
                base.set(field.name.as_str(), self.field_value(&doc, field)?);
            }
        }

        let options: Vec<String> = match &self.config.options {
            Some(selector) => doc
                .query(selector)?
                .iter()
                .map(|element| doc.text_of(element))
                .filter(|text| !text.is_empty())
                .collect(),
            None => Vec::new(),
        };

        if options.is_empty() {
            for (field, values) in per_option {
                match values.len() {
                    0 if field.optional => base.set(field.name.as_str(), ""),
                    0 => {
                        return Err(HarvestError::not_found(
                            format!("'{}' for {}", field.selector, field.name),
                            url,
                        ))
                    }
                    1 => base.set(field.name.as_str(), values[0].clone()),
                    n => {
                        return Err(HarvestError::inconsistent(
                            url,
                            format!("{} values for {} but no options", n, field.name),
                        ))
                    }
                }
            }
            return Ok(vec![base]);
        }

        for (field, values) in &per_option {
            if values.len() != options.len() && values.len() != 1 {
                return Err(HarvestError::inconsistent(
                    url,
                    format!(
                        "{} options but {} values for {}",
                        options.len(),
                        values.len(),
                        field.name
                    ),
                ));
            }
        }

        let rows = options
            .into_iter()
            .enumerate()
            .map(|(i, option)| {
                let mut row = base.clone().with(OPTION_FIELD, option);
                for (field, values) in &per_option {
                    let value = values.get(i).unwrap_or(&values[0]).clone();
                    row.set(field.name.as_str(), value);
                }
                row
            })
            .collect();

        Ok(rows)
    }

    /// Waits out lazily loaded content on a live page
    ///
    /// The page is focused between attempts until the placeholder is gone;
    /// the settled content replaces the cached copy.
    async fn settle(
        &self,
        ctx: &ProductContext<'_>,
        product: &ProductRef,
        placeholder: &str,
    ) -> Result<Vec<u8>> {
        tracing::debug!("Placeholder on {}, waiting for lazy content", product.url);

        let page = Mutex::new(ctx.open(&product.url).await?);
        let slot = &page;
        let focus = self.config.focus.as_str();

        let settled = retry_while(
            move || async move {
                let page = slot.lock().await;
                page.content().await.map_err(HarvestError::from)
            },
            contains(placeholder),
            move || async move {
                let mut page = slot.lock().await;
                if let Err(e) = page.focus(focus).await {
                    tracing::debug!("Focus on '{}' failed: {}", focus, e);
                }
            },
            ctx.lazy_retries,
        )
        .await;

        let mut page = page.into_inner();
        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close page for {}: {}", product.url, e);
        }

        let content = settled?.into_bytes();
        ctx.store(&ctx.product_key(&product.id), &content)?;
        Ok(content)
    }
}

#[async_trait]
impl SiteExtractor for SelectorExtractor {
    fn page_url(&self, category: &Category, pageno: u32) -> Result<String> {
        let mut url = Url::parse(&category.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("category {}: {}", category.name, e))
        })?;

        let param = self.config.page_param.as_str();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != param)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(param, &pageno.to_string());

        Ok(url.to_string())
    }

    fn count_products(&self, document: &dyn Document) -> Result<Option<usize>> {
        Ok(Some(document.query(&self.config.products)?.len()))
    }

    fn product_ref(
        &self,
        document: &dyn Document,
        index: usize,
        page_url: &str,
    ) -> Result<ProductRef> {
        let items = document.query(&self.config.products)?;
        let item = items
            .get(index)
            .ok_or_else(|| HarvestError::not_found(format!("product #{}", index), page_url))?;

        let href = item
            .select(&self.config.link)?
            .into_iter()
            .find_map(|link| link.attr("href").map(str::to_string))
            .ok_or_else(|| {
                HarvestError::not_found(format!("link of product #{}", index), page_url)
            })?;

        let url = resolve_link(&href, page_url).ok_or_else(|| {
            HarvestError::not_found(format!("usable link '{}'", href), page_url)
        })?;

        Ok(ProductRef {
            id: self.id_from_url(&url),
            url,
        })
    }

    async fn extract_rows(
        &self,
        ctx: &ProductContext<'_>,
        product: &ProductRef,
    ) -> Result<Vec<Row>> {
        let key = ctx.product_key(&product.id);
        let mut content = ctx.load(&product.url, &key, false).await?;

        if let Some(placeholder) = &self.config.placeholder {
            if String::from_utf8_lossy(&content).contains(placeholder.as_str()) {
                content = self.settle(ctx, product, placeholder).await?;
            }
        }

        let parsed = self.rows_from(&product.url, &content, ParserEngine::Document, product);
        match parsed {
            Err(HarvestError::ParseFailure { message, .. }) => {
                tracing::warn!(
                    "Parse failure on {} ({}), re-fetching with fragment parser",
                    product.url,
                    message
                );
                let fresh = ctx.load(&product.url, &key, true).await?;
                self.rows_from(&product.url, &fresh, ParserEngine::Fragment, product)
            }
            other => other,
        }
    }

    async fn extract_url(&self, ctx: &ProductContext<'_>, url: &str) -> Result<Vec<Row>> {
        let product = ProductRef {
            id: self.id_from_url(url),
            url: url.to_string(),
        };
        self.extract_rows(ctx, &product).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, selector: &str) -> FieldSelector {
        FieldSelector {
            name: name.into(),
            selector: selector.into(),
            attr: None,
            integer: false,
            optional: false,
            per_option: false,
        }
    }

    fn extractor(fields: Vec<FieldSelector>, options: Option<&str>) -> SelectorExtractor {
        SelectorExtractor::new(ExtractConfig {
            products: "li.item".into(),
            link: "a".into(),
            id_pattern: Some(r"pcode=(\d+)".into()),
            page_param: "page".into(),
            options: options.map(str::to_string),
            placeholder: None,
            focus: "img".into(),
            field: fields,
        })
        .unwrap()
    }

    fn product() -> ProductRef {
        ProductRef {
            id: "11".into(),
            url: "https://shop.example.com/item?pcode=11".into(),
        }
    }

    const LISTING: &str = r#"
        <ul>
            <li class="item"><a href="/item?pcode=11">Dome Tent</a></li>
            <li class="item"><span>sold out</span></li>
            <li class="item"><a href="item?pcode=13">Tarp</a></li>
        </ul>
    "#;

    const PRODUCT: &str = r#"
        <html><body>
            <h1 class="name"> Dome Tent </h1>
            <span class="price">129,000 won</span>
            <img class="thumb" src="https://cdn.example.com/11.jpg">
            <select>
                <option class="opt">Green</option>
                <option class="opt">Sand</option>
            </select>
            <span class="opt-price">129,000</span>
            <span class="opt-price">134,000</span>
        </body></html>
    "#;

    #[test]
    fn test_page_url_replaces_page_param() {
        let ex = extractor(vec![], None);
        let category = Category {
            name: "Tents".into(),
            url: "https://shop.example.com/list?cate=1&page=9".into(),
        };
        assert_eq!(
            ex.page_url(&category, 2).unwrap(),
            "https://shop.example.com/list?cate=1&page=2"
        );
    }

    #[test]
    fn test_count_and_resolve_products() {
        let ex = extractor(vec![], None);
        let page_url = "https://shop.example.com/list?cate=1&page=1";
        let doc = parse(page_url, LISTING.as_bytes(), ParserEngine::Document).unwrap();

        assert_eq!(ex.count_products(&doc).unwrap(), Some(3));

        let first = ex.product_ref(&doc, 0, page_url).unwrap();
        assert_eq!(first.id, "11");
        assert_eq!(first.url, "https://shop.example.com/item?pcode=11");

        let third = ex.product_ref(&doc, 2, page_url).unwrap();
        assert_eq!(third.id, "13");

        assert!(matches!(
            ex.product_ref(&doc, 1, page_url),
            Err(HarvestError::NotFound { .. })
        ));
        assert!(matches!(
            ex.product_ref(&doc, 7, page_url),
            Err(HarvestError::NotFound { .. })
        ));
    }

    #[test]
    fn test_id_falls_back_to_url() {
        let ex = extractor(vec![], None);
        assert_eq!(
            ex.id_from_url("https://shop.example.com/special/dome"),
            "https://shop.example.com/special/dome"
        );
    }

    #[test]
    fn test_rows_without_options() {
        let mut price = field("price", ".price");
        price.integer = true;
        let mut image = field("image", "img.thumb");
        image.attr = Some("src".into());
        let mut brand = field("brand", ".brand");
        brand.optional = true;

        let ex = extractor(vec![field("name", "h1.name"), price, image, brand], None);
        let rows = ex
            .rows_from(&product().url, PRODUCT.as_bytes(), ParserEngine::Document, &product())
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get("product_id"), Some(&Value::Text("11".into())));
        assert_eq!(row.get("name"), Some(&Value::Text("Dome Tent".into())));
        assert_eq!(row.get("price"), Some(&Value::Int(129_000)));
        assert_eq!(
            row.get("image"),
            Some(&Value::Text("https://cdn.example.com/11.jpg".into()))
        );
        assert_eq!(row.get("brand"), Some(&Value::Text(String::new())));
    }

    #[test]
    fn test_missing_required_field_is_not_found() {
        let ex = extractor(vec![field("brand", ".brand")], None);
        let err = ex
            .rows_from(&product().url, PRODUCT.as_bytes(), ParserEngine::Document, &product())
            .unwrap_err();
        assert!(matches!(err, HarvestError::NotFound { .. }));
    }

    #[test]
    fn test_one_row_per_option() {
        let mut opt_price = field("price", ".opt-price");
        opt_price.integer = true;
        opt_price.per_option = true;

        let ex = extractor(vec![field("name", "h1.name"), opt_price], Some("option.opt"));
        let rows = ex
            .rows_from(&product().url, PRODUCT.as_bytes(), ParserEngine::Document, &product())
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(OPTION_FIELD), Some(&Value::Text("Green".into())));
        assert_eq!(rows[1].get(OPTION_FIELD), Some(&Value::Text("Sand".into())));
        assert_eq!(rows[1].get("price"), Some(&Value::Int(134_000)));
        // Shared fields repeat on every row
        assert_eq!(rows[0].get("name"), rows[1].get("name"));
    }

    #[test]
    fn test_option_count_mismatch_is_inconsistent() {
        let mut thumbs = field("thumb", ".opt-price, .price");
        thumbs.per_option = true;

        let ex = extractor(vec![thumbs], Some("option.opt"));
        let err = ex
            .rows_from(&product().url, PRODUCT.as_bytes(), ParserEngine::Document, &product())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InconsistentData);
    }
}
