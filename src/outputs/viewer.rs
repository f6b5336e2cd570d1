//! HTML viewer shell for one feed or category.
//!
//! The shell holds no embeds itself. On load it fetches its sibling
//! `<stem>_data.json`, renders the current page, and builds each iframe from
//! the record's `embed` parameters with `loading="lazy"`.
//!
//! Behaviour in the browser:
//!
//! - previous/next buttons plus a window of numbered buttons around the
//!   current page, with jumps to the first and last page outside the window
//! - ArrowLeft / ArrowRight move one page, clamped at both ends
//! - each item has a "mark as listened" toggle stored in `localStorage`
//!   under `embed_digest_listened_<stem>`; `sync` reads the same key
//!
//! Because of `fetch()` the shell has to be served over HTTP, see
//! [`crate::serve`].

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::error::Result;
use crate::utils::data_file_name;

/// Prefix of the `localStorage` key that holds listened ids.
pub const LISTENED_KEY_PREFIX: &str = "embed_digest_listened_";

pub fn listened_key(stem: &str) -> String {
    format!("{LISTENED_KEY_PREFIX}{stem}")
}

/// Values baked into one shell.
#[derive(Debug, Clone, Copy)]
pub struct ShellOptions<'a> {
    pub display_name: &'a str,
    pub stem: &'a str,
    pub total_pages: usize,
    pub total_items: usize,
    pub max_page_buttons: usize,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewerConfig {
    title: String,
    data_file: String,
    storage_key: String,
    total_pages: usize,
    max_page_buttons: usize,
}

/// Render the shell document.
pub fn render_shell(opts: &ShellOptions<'_>) -> Result<String> {
    let config = ViewerConfig {
        title: opts.display_name.to_string(),
        data_file: urlencoding::encode(&data_file_name(opts.stem)).into_owned(),
        storage_key: listened_key(opts.stem),
        total_pages: opts.total_pages,
        max_page_buttons: opts.max_page_buttons.max(1),
    };
    // `<` only occurs inside JSON strings; escaped so nothing can close the script element.
    let config_json = serde_json::to_string(&config)?.replace('<', "\\u003c");
    let title = html_escape::encode_text(opts.display_name);

    let mut html = String::with_capacity(STYLE.len() + SCRIPT.len() + 2048);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    let _ = writeln!(html, "<title>{title} - Embeds</title>");
    let _ = writeln!(html, "<style>{STYLE}</style>");
    html.push_str("</head>\n<body>\n<div class=\"container\">\n<header>\n");
    let _ = writeln!(html, "<h1>{title}</h1>");
    let _ = writeln!(
        html,
        "<p class=\"stats\">{} embeds · {} pages</p>",
        opts.total_items, opts.total_pages
    );
    html.push_str("<p><a href=\"index.html\">← All feeds</a></p>\n</header>\n");
    html.push_str("<nav class=\"pagination\" id=\"pagination-top\"></nav>\n");
    html.push_str("<main id=\"content\"><div class=\"loading\">Loading…</div></main>\n");
    html.push_str("<nav class=\"pagination\" id=\"pagination-bottom\"></nav>\n");
    html.push_str("<footer><p>Use ← and → to change page.</p></footer>\n</div>\n");
    let _ = writeln!(
        html,
        "<script id=\"viewer-config\" type=\"application/json\">{config_json}</script>"
    );
    let _ = writeln!(html, "<script>{SCRIPT}</script>");
    html.push_str("</body>\n</html>\n");
    Ok(html)
}

static CONFIG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#viewer-config").unwrap());

/// Display name baked into an existing shell, if it has a readable config.
pub fn read_display_name(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let script = document.select(&CONFIG_SELECTOR).next()?;
    let raw: String = script.text().collect();
    serde_json::from_str::<ViewerConfig>(&raw)
        .ok()
        .map(|config| config.title)
        .filter(|title| !title.trim().is_empty())
}

const STYLE: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Ubuntu, sans-serif;
    background: #1f1f28; color: #dcd7ba; line-height: 1.5; padding: 20px;
}
a { color: #9a64ff; }
.container { max-width: 1100px; margin: 0 auto; }
header { text-align: center; margin-bottom: 24px; }
header h1 { font-size: 2em; margin-bottom: 6px; }
.stats { color: #938aa9; }
.pagination { display: flex; flex-wrap: wrap; justify-content: center; gap: 6px; margin: 16px 0; }
.page-btn {
    background: #2a2a37; color: #dcd7ba; border: 1px solid #363646;
    border-radius: 6px; padding: 6px 12px; cursor: pointer; font-size: 0.95em;
}
.page-btn:hover:not(:disabled) { background: #363646; }
.page-btn.active { background: #9a64ff; border-color: #9a64ff; color: #fff; }
.page-btn:disabled { opacity: 0.4; cursor: default; }
.gap { color: #727169; padding: 6px 4px; }
.embeds-grid { display: grid; gap: 18px; }
.embed-item { background: #2a2a37; border-radius: 10px; padding: 16px; border: 1px solid #363646; }
.embed-item.listened { opacity: 0.55; }
.embed-type { font-size: 0.85em; color: #938aa9; text-transform: uppercase; letter-spacing: 0.05em; }
.embed-item h3 { margin: 4px 0; font-size: 1.1em; }
.meta { font-size: 0.85em; color: #938aa9; margin-bottom: 8px; }
.embed-container { margin: 10px 0; }
.embed-container iframe { border: 0; max-width: 100%; }
.listen-btn {
    background: #363646; color: #dcd7ba; border: 0; border-radius: 6px;
    padding: 6px 14px; cursor: pointer;
}
.listen-btn.listened { background: #76946a; color: #fff; }
.loading, .empty { text-align: center; color: #938aa9; padding: 40px; }
footer { text-align: center; color: #727169; font-size: 0.85em; margin-top: 24px; }
"#;

const SCRIPT: &str = r#"
(function () {
    const config = JSON.parse(document.getElementById('viewer-config').textContent);
    const icons = { bandcamp: '🎵', youtube: '📺', soundcloud: '🔊' };
    const names = { bandcamp: 'Bandcamp', youtube: 'YouTube', soundcloud: 'SoundCloud' };
    let pages = {};
    let totalPages = config.totalPages;
    let currentPage = 1;
    let listened = new Set();

    function loadListened() {
        try {
            const stored = localStorage.getItem(config.storageKey);
            if (stored) listened = new Set(JSON.parse(stored));
        } catch (err) {
            console.error('Could not read listened items', err);
        }
    }

    function saveListened() {
        try {
            localStorage.setItem(config.storageKey, JSON.stringify(Array.from(listened)));
        } catch (err) {
            console.error('Could not save listened items', err);
        }
    }

    function el(tag, attrs, text) {
        const node = document.createElement(tag);
        for (const [key, value] of Object.entries(attrs || {})) node.setAttribute(key, value);
        if (text !== undefined) node.textContent = text;
        return node;
    }

    function frame(src, width, height, extra) {
        const node = el('iframe', Object.assign({ src: src, width: width, height: height }, extra || {}));
        node.loading = 'lazy';
        return node;
    }

    function player(item) {
        const p = item.embed || {};
        switch (p.kind) {
            case 'bandcamp_album':
            case 'bandcamp_track': {
                const key = p.kind === 'bandcamp_album' ? 'album=' + p.album_id : 'track=' + p.track_id;
                return frame('https://bandcamp.com/EmbeddedPlayer/' + key +
                    '/size=large/bgcol=1f1f28/linkcol=9a64ff/tracklist=false/artwork=small/transparent=true/',
                    '400', '120', { seamless: '' });
            }
            case 'youtube':
                return frame('https://www.youtube.com/embed/' + encodeURIComponent(p.video_id),
                    '560', '315', {
                        allow: 'accelerometer; clipboard-write; encrypted-media; gyroscope; picture-in-picture; web-share',
                        allowfullscreen: ''
                    });
            case 'soundcloud':
                return frame('https://w.soundcloud.com/player/?url=' + encodeURIComponent(p.track_url) +
                    '&color=%239a64ff&auto_play=false&hide_related=true&show_comments=false&show_user=true&show_reposts=false',
                    '100%', '166', { scrolling: 'no', allow: 'autoplay' });
            default: {
                const wrap = el('p', {}, 'Bandcamp: ');
                wrap.appendChild(el('a', { href: item.url, target: '_blank', rel: 'noopener' }, item.url));
                return wrap;
            }
        }
    }

    function card(item) {
        const isListened = listened.has(item.id);
        const node = el('div', { class: 'embed-item' + (isListened ? ' listened' : '') });
        node.appendChild(el('div', { class: 'embed-type' }, (icons[item.type] || '') + ' ' + (names[item.type] || item.type)));
        node.appendChild(el('h3', {}, item.title));
        const meta = [item.date];
        if (item.author) meta.push(item.author);
        if (item.feed) meta.push(item.feed);
        node.appendChild(el('p', { class: 'meta' }, meta.join(' · ')));
        if (item.article_link) {
            const link = el('p');
            link.appendChild(el('a', { href: item.article_link, target: '_blank', rel: 'noopener' }, 'Original article →'));
            node.appendChild(link);
        }
        const container = el('div', { class: 'embed-container' });
        container.appendChild(player(item));
        node.appendChild(container);
        const btn = el('button', { class: 'listen-btn' + (isListened ? ' listened' : '') },
            isListened ? '✓ Listened' : 'Mark as listened');
        btn.addEventListener('click', function () {
            if (listened.has(item.id)) listened.delete(item.id); else listened.add(item.id);
            saveListened();
            const now = listened.has(item.id);
            node.classList.toggle('listened', now);
            btn.classList.toggle('listened', now);
            btn.textContent = now ? '✓ Listened' : 'Mark as listened';
        });
        node.appendChild(btn);
        return node;
    }

    function pageButton(label, target, opts) {
        const btn = el('button', { class: 'page-btn' + (opts && opts.active ? ' active' : '') }, String(label));
        if (opts && opts.disabled) btn.disabled = true;
        else if (!(opts && opts.active)) btn.addEventListener('click', function () { changePage(target); });
        return btn;
    }

    function renderPagination() {
        for (const id of ['pagination-top', 'pagination-bottom']) {
            const nav = document.getElementById(id);
            nav.replaceChildren();
            if (totalPages < 2) continue;
            nav.appendChild(pageButton('← Prev', currentPage - 1, { disabled: currentPage <= 1 }));
            const max = config.maxPageButtons;
            let start = Math.max(1, currentPage - Math.floor(max / 2));
            const end = Math.min(totalPages, start + max - 1);
            start = Math.max(1, Math.min(start, end - max + 1));
            if (start > 1) {
                nav.appendChild(pageButton(1, 1));
                if (start > 2) nav.appendChild(el('span', { class: 'gap' }, '…'));
            }
            for (let i = start; i <= end; i++) {
                nav.appendChild(pageButton(i, i, { active: i === currentPage }));
            }
            if (end < totalPages) {
                if (end < totalPages - 1) nav.appendChild(el('span', { class: 'gap' }, '…'));
                nav.appendChild(pageButton(totalPages, totalPages));
            }
            nav.appendChild(pageButton('Next →', currentPage + 1, { disabled: currentPage >= totalPages }));
        }
    }

    function showPage(n) {
        const content = document.getElementById('content');
        content.replaceChildren();
        const items = pages[String(n)] || [];
        if (items.length === 0) {
            content.appendChild(el('div', { class: 'empty' }, 'Nothing left to listen to.'));
        } else {
            const grid = el('div', { class: 'embeds-grid' });
            for (const item of items) grid.appendChild(card(item));
            content.appendChild(grid);
        }
        currentPage = n;
        renderPagination();
        window.scrollTo({ top: 0, behavior: 'smooth' });
    }

    function changePage(n) {
        if (n >= 1 && n <= totalPages && n !== currentPage) showPage(n);
    }

    document.addEventListener('keydown', function (e) {
        if (e.target && (e.target.tagName === 'INPUT' || e.target.tagName === 'TEXTAREA')) return;
        if (e.key === 'ArrowLeft') changePage(currentPage - 1);
        else if (e.key === 'ArrowRight') changePage(currentPage + 1);
    });

    loadListened();
    fetch(config.dataFile)
        .then(function (resp) {
            if (!resp.ok) throw new Error('HTTP ' + resp.status);
            return resp.json();
        })
        .then(function (data) {
            pages = data;
            totalPages = Object.keys(pages).length;
            showPage(1);
        })
        .catch(function (err) {
            const content = document.getElementById('content');
            content.replaceChildren(el('div', { class: 'empty' },
                'Could not load ' + config.dataFile + ' (' + err.message + '). Serve this directory over HTTP.'));
        });
})();
"#;
