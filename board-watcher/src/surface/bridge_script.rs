//! Node.js side of the Playwright bridge.
//!
//! Reads one JSON request per line from stdin, runs it against a single
//! Chromium page, and writes one JSON response per line to stdout.
//! Requests are processed strictly in order.

/// Source passed to `node -e`
pub const BRIDGE_SCRIPT: &str = r#"
'use strict';
const readline = require('readline');
const { chromium } = require('playwright');

let browser = null;
let context = null;
let page = null;

function requirePage() {
  if (!page) throw new Error('page is not open');
  return page;
}

function snippet(p) {
  return requirePage().locator(p.selector).nth(p.index);
}

async function subElement(p) {
  const root = snippet(p);
  const target = p.sub ? root.locator(p.sub).first() : root;
  if ((await target.count()) === 0) return null;
  return target;
}

const handlers = {
  async launch(p) {
    browser = await chromium.launch({ headless: p.headless });
    const options = {};
    if (p.storageState) options.storageState = p.storageState;
    context = await browser.newContext(options);
    page = await context.newPage();
    return null;
  },
  async setDefaultTimeouts(p) {
    const pg = requirePage();
    pg.setDefaultNavigationTimeout(p.navigationMs);
    pg.setDefaultTimeout(p.operationMs);
    return null;
  },
  async goto(p) {
    await requirePage().goto(p.url, { waitUntil: p.waitUntil, timeout: p.timeoutMs });
    return null;
  },
  async reload(p) {
    await requirePage().reload({ waitUntil: p.waitUntil, timeout: p.timeoutMs });
    return null;
  },
  async waitForSelector(p) {
    try {
      await requirePage().waitForSelector(p.selector, { state: p.state, timeout: p.timeoutMs });
      return true;
    } catch (e) {
      if (e && e.name === 'TimeoutError') return false;
      throw e;
    }
  },
  async count(p) {
    return await requirePage().locator(p.selector).count();
  },
  async readText(p) {
    const el = await subElement(p);
    return el ? await el.innerText() : null;
  },
  async readAttribute(p) {
    const el = await subElement(p);
    return el ? await el.getAttribute(p.attribute) : null;
  },
  async url() {
    return requirePage().url();
  },
  async title() {
    return await requirePage().title();
  },
  async screenshot(p) {
    await requirePage().screenshot({ path: p.path, fullPage: true });
    return null;
  },
  async content() {
    return await requirePage().content();
  },
  async storageState(p) {
    if (!context) throw new Error('context is not open');
    await context.storageState({ path: p.path });
    return null;
  },
  async closePage() {
    const pg = page;
    page = null;
    if (pg) await pg.close();
    return null;
  },
  async closeContext() {
    const ctx = context;
    context = null;
    if (ctx) await ctx.close();
    return null;
  },
  async closeBrowser() {
    const b = browser;
    browser = null;
    if (b) await b.close();
    return null;
  },
};

function reply(message) {
  process.stdout.write(JSON.stringify(message) + '\n');
}

async function handle(line) {
  let request;
  try {
    request = JSON.parse(line);
  } catch (e) {
    reply({ id: null, ok: false, error: { name: 'ProtocolError', message: 'malformed request' } });
    return;
  }
  const handler = handlers[request.method];
  if (!handler) {
    reply({ id: request.id, ok: false, error: { name: 'ProtocolError', message: 'unknown method ' + request.method } });
    return;
  }
  try {
    const result = await handler(request.params || {});
    reply({ id: request.id, ok: true, result: result === undefined ? null : result });
  } catch (e) {
    const name = (e && e.name) || 'Error';
    const message = String((e && e.message) || e);
    reply({ id: request.id, ok: false, error: { name, message } });
  }
}

let queue = Promise.resolve();
const rl = readline.createInterface({ input: process.stdin });
rl.on('line', (line) => {
  queue = queue.then(() => handle(line));
});
rl.on('close', () => {
  queue.then(async () => {
    if (browser) {
      try { await browser.close(); } catch (_) {}
    }
    process.exit(0);
  });
});
"#;
